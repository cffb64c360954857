//! Replacement policies consulted by the [`crate::BufferPool`] when no free
//! frame is available.

use hashbrown::HashMap;
use lru::LruCache;

/// Index into the buffer pool's frame array. Not exposed outside this crate.
pub(crate) type FrameId = usize;

/// Capability set a replacement policy must provide. `pick_victim` must be
/// deterministic given the prior sequence of calls.
pub trait ReplacementPolicy: std::fmt::Debug {
    /// Registers a newly created frame. Called once per frame at pool init.
    fn add_frame(&mut self, frame: FrameId);
    /// Drops a frame from consideration entirely (used by `delete_page`).
    fn remove_frame(&mut self, frame: FrameId);
    /// Records that `frame` was just read or written.
    fn on_access(&mut self, frame: FrameId);
    /// Records that `frame` became pinned (pin_count 0 -> >0 transition).
    fn on_pin(&mut self, frame: FrameId);
    /// Records that `frame`'s pin_count reached 0.
    fn on_unpin(&mut self, frame: FrameId);
    /// Returns an unpinned frame to evict, or `None` if none is evictable.
    fn pick_victim(&mut self) -> Option<FrameId>;
}

/// Least-recently-used eviction order backed directly by [`lru::LruCache`]:
/// `on_pin` pops a frame out of the cache entirely so a pinned frame can
/// never surface from `pick_victim`; `on_access`/`on_unpin` both touch (or
/// reinsert) the frame at the most-recently-used end, self-healing the
/// one-entry-per-frame invariant regardless of which of the two call sites
/// last touched it — `BufferPool::fetch` calls both on a single cache hit.
#[derive(Debug)]
pub struct LruPolicy {
    order: LruCache<FrameId, ()>,
}

impl LruPolicy {
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }
}

impl Default for LruPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplacementPolicy for LruPolicy {
    fn add_frame(&mut self, frame: FrameId) {
        self.order.put(frame, ());
    }

    fn remove_frame(&mut self, frame: FrameId) {
        self.order.pop(&frame);
    }

    fn on_access(&mut self, frame: FrameId) {
        self.order.get(&frame);
    }

    fn on_pin(&mut self, frame: FrameId) {
        self.order.pop(&frame);
    }

    fn on_unpin(&mut self, frame: FrameId) {
        self.order.put(frame, ());
    }

    fn pick_victim(&mut self) -> Option<FrameId> {
        self.order.peek_lru().map(|(&frame, ())| frame)
    }
}

/// A ring of `(frame, ref_bit, pinned)` entries with a sweeping hand. Unlike
/// LRU, frames keep a permanent ring slot for their lifetime in the pool;
/// pin state is tracked in-place rather than by removing the entry. There's
/// no off-the-shelf CLOCK crate in the dependency set the rest of this
/// workspace draws from, so the ring and sweep are hand-rolled here.
#[derive(Debug, Default)]
pub struct ClockPolicy {
    ring: Vec<ClockEntry>,
    index: HashMap<FrameId, usize>,
    hand: usize,
}

#[derive(Debug, Clone, Copy)]
struct ClockEntry {
    frame: FrameId,
    ref_bit: bool,
    pinned: bool,
}

impl ClockPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplacementPolicy for ClockPolicy {
    fn add_frame(&mut self, frame: FrameId) {
        self.index.insert(frame, self.ring.len());
        self.ring.push(ClockEntry {
            frame,
            ref_bit: false,
            pinned: false,
        });
    }

    fn remove_frame(&mut self, frame: FrameId) {
        let Some(idx) = self.index.remove(&frame) else {
            return;
        };
        self.ring.remove(idx);
        // Every entry at or past idx shifted down by one; rebuild the index.
        self.index.clear();
        for (i, entry) in self.ring.iter().enumerate() {
            self.index.insert(entry.frame, i);
        }
        if !self.ring.is_empty() {
            self.hand %= self.ring.len();
        } else {
            self.hand = 0;
        }
    }

    fn on_access(&mut self, frame: FrameId) {
        if let Some(&idx) = self.index.get(&frame) {
            self.ring[idx].ref_bit = true;
        }
    }

    fn on_pin(&mut self, frame: FrameId) {
        if let Some(&idx) = self.index.get(&frame) {
            self.ring[idx].pinned = true;
        }
    }

    fn on_unpin(&mut self, frame: FrameId) {
        if let Some(&idx) = self.index.get(&frame) {
            self.ring[idx].pinned = false;
            self.ring[idx].ref_bit = true;
        }
    }

    fn pick_victim(&mut self) -> Option<FrameId> {
        if self.ring.is_empty() {
            return None;
        }
        let start = self.hand;
        loop {
            let entry = &mut self.ring[self.hand];
            if !entry.pinned {
                if entry.ref_bit {
                    entry.ref_bit = false;
                } else {
                    let victim = entry.frame;
                    self.hand = (self.hand + 1) % self.ring.len();
                    return Some(victim);
                }
            }
            self.hand = (self.hand + 1) % self.ring.len();
            if self.hand == start {
                return None;
            }
        }
    }
}
