//! Table storage: aligned clusters, lock-free probe/write, generation aging.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use super::entry::{TTData, TTEntry};
use super::{CLUSTER_SIZE, GENERATION_DELTA, GENERATION_MASK};
use crate::types::{Bound, Depth, Move, Value};

/// Three entries sharing one hash slot; sized to half a cache line.
#[repr(C, align(32))]
#[derive(Clone, Copy)]
pub(super) struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
    _padding: [u8; 2],
}

impl Cluster {
    const fn new() -> Self {
        Self {
            entries: [TTEntry::new(); CLUSTER_SIZE],
            _padding: [0; 2],
        }
    }
}

const _: () = assert!(std::mem::size_of::<Cluster>() == 32);

/// Shared lossy cache. Probes and saves race freely; every read is
/// re-validated by the callers, so no synchronization beyond the generation
/// counter is used.
pub struct TranspositionTable {
    table: UnsafeCell<Vec<Cluster>>,
    cluster_count: usize,
    generation8: AtomicU8,
}

// Concurrent racy access is the table's documented contract.
unsafe impl Send for TranspositionTable {}
unsafe impl Sync for TranspositionTable {}

impl TranspositionTable {
    /// Cluster count for a size in MiB; kept a power of two so the index
    /// mask stays disjoint from the upper-16-bit key tag.
    fn cluster_count_for(mb_size: usize) -> usize {
        let raw = (mb_size.max(1) * 1024 * 1024 / std::mem::size_of::<Cluster>()).max(2);
        1usize << (usize::BITS - 1 - raw.leading_zeros())
    }

    /// Allocate with a size in MiB.
    pub fn new(mb_size: usize) -> Self {
        let cluster_count = Self::cluster_count_for(mb_size);
        Self {
            table: UnsafeCell::new(vec![Cluster::new(); cluster_count]),
            cluster_count,
            generation8: AtomicU8::new(0),
        }
    }

    pub fn resize(&mut self, mb_size: usize) {
        let new_count = Self::cluster_count_for(mb_size);
        if new_count != self.cluster_count {
            *self.table.get_mut() = vec![Cluster::new(); new_count];
            self.cluster_count = new_count;
        }
    }

    /// Zero every entry, splitting the sweep over the available cores.
    pub fn clear(&mut self) {
        self.generation8.store(0, Ordering::Relaxed);
        let table = self.table.get_mut();
        let len = table.len();
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        if threads <= 1 || len < threads * 1024 {
            table.fill(Cluster::new());
            return;
        }

        let chunk = len.div_ceil(threads);
        std::thread::scope(|scope| {
            for slice in table.chunks_mut(chunk) {
                scope.spawn(move || slice.fill(Cluster::new()));
            }
        });
    }

    /// Advance the generation at the start of a new search.
    pub fn new_search(&self) {
        self.generation8
            .fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    #[inline]
    fn cluster_index(&self, key: u64) -> usize {
        (key as usize) & (self.cluster_count - 1)
    }

    #[inline]
    fn cluster_ptr(&self, key: u64) -> *mut Cluster {
        let idx = self.cluster_index(key);
        // SAFETY: idx < cluster_count by construction of cluster_index.
        unsafe { (*self.table.get()).as_mut_ptr().add(idx) }
    }

    /// Scan the cluster for the key tag. On a hit the entry's generation is
    /// refreshed; on a miss the returned writer points at the replacement
    /// victim with the smallest age-discounted depth.
    pub fn probe(&self, key: u64) -> ProbeResult {
        let key16 = (key >> 48) as u16;
        let cluster = self.cluster_ptr(key);
        // SAFETY: the pointer is in-bounds; racy entry access is the
        // documented lossy contract of this table.
        let entries = unsafe { &mut (*cluster).entries };

        for entry in entries.iter_mut() {
            if entry.key16() == key16 && entry.is_occupied() {
                let data = entry.read();
                // Keep the hit entry young without disturbing pv/bound bits.
                entry.refresh_generation(self.generation());
                return ProbeResult {
                    found: true,
                    data,
                    writer: entry as *mut TTEntry,
                };
            }
        }

        let gen8 = self.generation();
        let mut writer = &mut entries[0] as *mut TTEntry;
        let mut worst = i32::MAX;
        for entry in entries.iter_mut() {
            let priority = entry.depth8() as i32 - entry.relative_age(gen8) as i32;
            if priority < worst {
                worst = priority;
                writer = entry as *mut TTEntry;
            }
        }

        ProbeResult {
            found: false,
            data: TTData::EMPTY,
            writer,
        }
    }

    /// Prefetch the cluster a future probe will touch.
    #[inline]
    pub fn prefetch(&self, key: u64) {
        let cluster = self.cluster_ptr(key);
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            _mm_prefetch(cluster as *const i8, _MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = cluster;
    }

    /// Occupancy of the current generation in permille, sampled over the
    /// first thousand clusters.
    pub fn hashfull(&self) -> i32 {
        let gen8 = self.generation();
        let sample = 1000.min(self.cluster_count);
        let mut count = 0;
        for i in 0..sample {
            // SAFETY: i < cluster_count.
            let cluster = unsafe { &(&*self.table.get())[i] };
            for entry in &cluster.entries {
                if entry.is_occupied() && (entry.relative_age(gen8) & GENERATION_MASK as u8) == 0 {
                    count += 1;
                }
            }
        }
        count / CLUSTER_SIZE as i32
    }
}

/// Outcome of a probe: the decoded data plus a writer for the save that may
/// follow at the end of the node.
pub struct ProbeResult {
    pub found: bool,
    pub data: TTData,
    writer: *mut TTEntry,
}

impl ProbeResult {
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        key: u64,
        value: Value,
        is_pv: bool,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
        generation8: u8,
    ) {
        // SAFETY: writer came out of probe() on a live table.
        unsafe {
            (*self.writer).save(
                (key >> 48) as u16,
                value,
                is_pv,
                bound,
                depth,
                mv,
                eval,
                generation8,
            );
        }
    }
}
