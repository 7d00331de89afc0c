//! In-process shard group.
//!
//! [`LocalGroup`] connects N shards running on N threads of one process.
//! Each all-reduce deposits the caller's buffer into a per-rank slot,
//! waits on a barrier until every shard has deposited, then sums the slots
//! with a pairwise tree over ranks. The tree shape depends only on the
//! world size, so the result is independent of thread scheduling and
//! bit-identical across runs.

use std::ops::AddAssign;
use std::sync::{Arc, Barrier, Mutex};

use super::Communicator;

struct Shared {
    barrier: Barrier,
    f64_slots: Mutex<Vec<Vec<f64>>>,
    f32_slots: Mutex<Vec<Vec<f32>>>,
}

/// Factory for connected in-process shard handles.
pub struct LocalGroup;

impl LocalGroup {
    /// Create `world_size` connected shard handles.
    ///
    /// Each handle is meant to move onto its own thread; every shard must
    /// participate in every collective call or the group deadlocks.
    ///
    /// # Panics
    ///
    /// Panics if `world_size` is zero.
    pub fn shards(world_size: usize) -> Vec<LocalShard> {
        assert!(world_size > 0, "world_size must be positive");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(world_size),
            f64_slots: Mutex::new(vec![Vec::new(); world_size]),
            f32_slots: Mutex::new(vec![Vec::new(); world_size]),
        });
        (0..world_size)
            .map(|rank| LocalShard {
                rank,
                world_size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

/// One shard's handle into a [`LocalGroup`].
pub struct LocalShard {
    rank: usize,
    world_size: usize,
    shared: Arc<Shared>,
}

impl LocalShard {
    fn exchange<T>(&self, slots: &Mutex<Vec<Vec<T>>>, buf: &mut [T])
    where
        T: Copy + AddAssign,
    {
        {
            let mut slots = slots.lock().unwrap();
            slots[self.rank].clear();
            slots[self.rank].extend_from_slice(buf);
        }
        // All deposits complete before anyone reads.
        self.shared.barrier.wait();
        {
            let slots = slots.lock().unwrap();
            for part in slots.iter() {
                assert_eq!(
                    part.len(),
                    buf.len(),
                    "all shards must reduce identically sized buffers"
                );
            }
            tree_sum_into(&slots, buf);
        }
        // No shard may start the next deposit while another still reads.
        self.shared.barrier.wait();
    }
}

impl Communicator for LocalShard {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn allreduce_sum_f64(&self, buf: &mut [f64]) {
        self.exchange(&self.shared.f64_slots, buf);
    }

    fn allreduce_sum_f32(&self, buf: &mut [f32]) {
        self.exchange(&self.shared.f32_slots, buf);
    }
}

/// Sum `parts` into `out` with a pairwise tree over rank indices.
///
/// Round k folds rank `i + 2^k` into rank `i` for every `i` divisible by
/// `2^(k+1)`; the final total accumulates in rank 0's copy. The summation
/// order is a function of the world size alone.
fn tree_sum_into<T>(parts: &[Vec<T>], out: &mut [T])
where
    T: Copy + AddAssign,
{
    let mut scratch: Vec<Vec<T>> = parts.to_vec();
    let n = scratch.len();
    let mut step = 1;
    while step < n {
        let mut i = 0;
        while i + step < n {
            let (head, tail) = scratch.split_at_mut(i + step);
            let dst = &mut head[i];
            let src = &tail[0];
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s;
            }
            i += 2 * step;
        }
        step *= 2;
    }
    out.copy_from_slice(&scratch[0]);
}
