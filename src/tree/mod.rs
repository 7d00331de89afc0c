//! Tree representation and node indexing.

pub mod layout;
mod model;

pub use model::{Tree, TreeValidationError, LEAF};
