//! Buffer pool: caches disk blocks in frames, enforces the pin discipline,
//! and delegates victim choice to a pluggable replacement policy.
//!
//! Pages are handed out as a scoped [`PageGuard`] rather than a raw pointer
//! into a frame; the guard releases its pin on `Drop` if the caller never
//! calls [`PageGuard::unpin`] explicitly.
//!
//! # Example
//! ```
//! use buffer::BufferPool;
//! use common::{Config, PageType, ReplacementPolicyKind};
//! use storage::Disk;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let config = Config::builder()
//!     .num_platters(2)
//!     .num_surfaces_per_platter(1)
//!     .num_cylinders(1)
//!     .num_sectors_per_track(8)
//!     .block_size(512)
//!     .sector_size(256)
//!     .buffer_pool_size(2)
//!     .replacement_policy(ReplacementPolicyKind::Lru)
//!     .build();
//! let disk = Disk::create(dir.path(), "T", &config).unwrap();
//! let mut pool = BufferPool::new(disk, &config);
//!
//! let (page_id, mut guard) = pool.new_page(PageType::Data).unwrap();
//! guard.bytes_mut()[0] = 0xAB;
//! drop(guard);
//! pool.flush(page_id).unwrap();
//! ```

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use hashbrown::HashMap;

use common::{Config, DbError, DbResult, LogicalPageId, PageType, ReplacementPolicyKind};
use storage::Disk;

mod policy;

use policy::{ClockPolicy, FrameId, LruPolicy, ReplacementPolicy};

/// A buffer-pool slot holding one block. Owned exclusively by the
/// [`BufferPool`] that allocated it; a [`PageGuard`] borrows from it through
/// a shared `RefCell` rather than taking a raw pointer.
#[derive(Debug)]
struct Frame {
    page_id: Option<LogicalPageId>,
    pin_count: u32,
    dirty: bool,
    valid: bool,
    buf: Vec<u8>,
}

impl Frame {
    fn empty(block_size: usize) -> Self {
        Frame {
            page_id: None,
            pin_count: 0,
            dirty: false,
            valid: false,
            buf: vec![0u8; block_size],
        }
    }
}

struct Inner {
    disk: Disk,
    block_size: usize,
    frames: Vec<Rc<RefCell<Frame>>>,
    page_table: HashMap<LogicalPageId, FrameId>,
    policy: Box<dyn ReplacementPolicy>,
}

/// Caches disk blocks in a fixed-size array of frames. Single-threaded and
/// cooperative: `BufferPool` is not `Send`/`Sync`, and nothing in this
/// crate spawns threads.
pub struct BufferPool {
    inner: Rc<RefCell<Inner>>,
}

impl BufferPool {
    /// Builds a pool of `config.buffer_pool_size` empty frames over `disk`,
    /// using the replacement policy named in `config`.
    pub fn new(disk: Disk, config: &Config) -> Self {
        let block_size = config.block_size as usize;
        let mut policy: Box<dyn ReplacementPolicy> = match config.replacement_policy {
            ReplacementPolicyKind::Lru => Box::new(LruPolicy::new()),
            ReplacementPolicyKind::Clock => Box::new(ClockPolicy::new()),
        };
        let frames: Vec<Rc<RefCell<Frame>>> = (0..config.buffer_pool_size)
            .map(|i| {
                policy.add_frame(i);
                Rc::new(RefCell::new(Frame::empty(block_size)))
            })
            .collect();
        BufferPool {
            inner: Rc::new(RefCell::new(Inner {
                disk,
                block_size,
                frames,
                page_table: HashMap::new(),
                policy,
            })),
        }
    }

    fn find_free_frame(inner: &Inner) -> Option<FrameId> {
        inner
            .frames
            .iter()
            .position(|f| !f.borrow().valid)
    }

    /// Finds a frame to hold a new page: a never-used frame if one exists,
    /// otherwise the replacement policy's victim. A dirty victim is flushed
    /// before being reused.
    fn claim_frame(inner: &mut Inner) -> DbResult<FrameId> {
        if let Some(free) = Self::find_free_frame(inner) {
            return Ok(free);
        }
        let victim = inner.policy.pick_victim().ok_or(DbError::BufferFull)?;
        let frame_rc = inner.frames[victim].clone();
        let (old_page_id, dirty) = {
            let frame = frame_rc.borrow();
            (frame.page_id, frame.dirty)
        };
        if let Some(old_id) = old_page_id {
            if dirty {
                let bytes = frame_rc.borrow().buf.clone();
                inner.disk.write_block(old_id, &bytes)?;
            }
            inner.page_table.remove(&old_id);
        }
        {
            let mut frame = frame_rc.borrow_mut();
            frame.page_id = None;
            frame.valid = false;
            frame.dirty = false;
        }
        Ok(victim)
    }

    /// Returns a pinned, scoped handle to `page_id`'s bytes, loading it from
    /// disk on a miss. Fails with `BufferFull` when no frame is free and the
    /// policy has no evictable candidate.
    pub fn fetch(&mut self, page_id: LogicalPageId) -> DbResult<PageGuard> {
        let frame_id = {
            let mut inner = self.inner.borrow_mut();
            if let Some(&existing) = inner.page_table.get(&page_id) {
                existing
            } else {
                let frame_id = Self::claim_frame(&mut inner)?;
                let bytes = inner.disk.read_block(page_id)?;
                if bytes.len() != inner.block_size {
                    return Err(DbError::Io(std::io::Error::other(
                        "short block read from disk",
                    )));
                }
                let frame_rc = inner.frames[frame_id].clone();
                {
                    let mut frame = frame_rc.borrow_mut();
                    frame.buf = bytes;
                    frame.page_id = Some(page_id);
                    frame.pin_count = 0;
                    frame.dirty = false;
                    frame.valid = true;
                }
                inner.page_table.insert(page_id, frame_id);
                frame_id
            }
        };

        let mut inner = self.inner.borrow_mut();
        inner.frames[frame_id].borrow_mut().pin_count += 1;
        // Both a cache hit and a miss notify access and pin: a hit can land
        // on a frame the policy still treats as a candidate (pin_count
        // reached 0 since the last fetch), so on_pin always runs to keep a
        // pinned frame from ever being chosen as a victim.
        inner.policy.on_access(frame_id);
        inner.policy.on_pin(frame_id);
        drop(inner);

        Ok(PageGuard {
            inner: self.inner.clone(),
            frame_id,
            page_id,
            released: false,
        })
    }

    /// Allocates a new page via the disk, loads an all-zero block into a
    /// frame, marks it dirty, and writes it through immediately so the
    /// sector files exist before the caller's first `unpin`.
    pub fn new_page(&mut self, page_type: PageType) -> DbResult<(LogicalPageId, PageGuard)> {
        let mut inner = self.inner.borrow_mut();
        let (page_id, _addr) = inner.disk.allocate(page_type)?;

        let frame_id = match Self::claim_frame(&mut inner) {
            Ok(id) => id,
            Err(e) => {
                let _ = inner.disk.deallocate(page_id);
                return Err(e);
            }
        };

        let zero = vec![0u8; inner.block_size];
        if let Err(e) = inner.disk.write_block(page_id, &zero) {
            let _ = inner.disk.deallocate(page_id);
            return Err(e);
        }

        {
            let frame_rc = inner.frames[frame_id].clone();
            let mut frame = frame_rc.borrow_mut();
            frame.buf = zero;
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = true;
            frame.valid = true;
        }
        inner.page_table.insert(page_id, frame_id);
        inner.policy.on_access(frame_id);
        inner.policy.on_pin(frame_id);
        drop(inner);

        Ok((
            page_id,
            PageGuard {
                inner: self.inner.clone(),
                frame_id,
                page_id,
                released: false,
            },
        ))
    }

    /// Decrements `page_id`'s pin count; `unpin`'s counterpart inside
    /// [`PageGuard::drop`] is how callers that forget an explicit call stay
    /// safe. Errors if the page isn't pooled or is already fully unpinned.
    pub fn unpin(&mut self, page_id: LogicalPageId, mark_dirty: bool) -> DbResult<()> {
        let mut inner = self.inner.borrow_mut();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or_else(|| DbError::NotFound(format!("page {page_id:?} not in pool")))?;
        let frame_rc = inner.frames[frame_id].clone();
        {
            let mut frame = frame_rc.borrow_mut();
            if frame.pin_count == 0 {
                return Err(DbError::InvalidParameter(format!(
                    "page {page_id:?} is already unpinned"
                )));
            }
            frame.pin_count -= 1;
            if mark_dirty {
                frame.dirty = true;
            }
        }
        if frame_rc.borrow().pin_count == 0 {
            inner.policy.on_unpin(frame_id);
        }
        Ok(())
    }

    /// Writes `page_id`'s bytes back to disk if dirty, then clears dirty.
    /// Allowed on a pinned page; does not unpin it.
    pub fn flush(&mut self, page_id: LogicalPageId) -> DbResult<()> {
        let mut inner = self.inner.borrow_mut();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or_else(|| DbError::NotFound(format!("page {page_id:?} not in pool")))?;
        Self::flush_frame(&mut inner, frame_id)
    }

    fn flush_frame(inner: &mut Inner, frame_id: FrameId) -> DbResult<()> {
        let frame_rc = inner.frames[frame_id].clone();
        let (page_id, dirty, bytes) = {
            let frame = frame_rc.borrow();
            (frame.page_id, frame.dirty, frame.buf.clone())
        };
        let Some(page_id) = page_id else {
            return Ok(());
        };
        if !dirty {
            return Ok(());
        }
        inner.disk.write_block(page_id, &bytes)?;
        frame_rc.borrow_mut().dirty = false;
        Ok(())
    }

    /// Flushes every dirty frame. A second consecutive call performs no
    /// writes, because the first call already cleared every `dirty` flag.
    pub fn flush_all(&mut self) -> DbResult<()> {
        let mut inner = self.inner.borrow_mut();
        let frame_ids: Vec<FrameId> = (0..inner.frames.len()).collect();
        let mut first_err = None;
        for frame_id in frame_ids {
            if let Err(e) = Self::flush_frame(&mut inner, frame_id) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Removes `page_id` from the pool and asks the disk to deallocate it.
    /// Fails with `PagePinned` if it is currently pinned.
    pub fn delete_page(&mut self, page_id: LogicalPageId) -> DbResult<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let pinned = inner.frames[frame_id].borrow().pin_count > 0;
            if pinned {
                return Err(DbError::PagePinned(page_id));
            }
            Self::flush_frame(&mut inner, frame_id)?;
            inner.page_table.remove(&page_id);
            {
                let mut frame = inner.frames[frame_id].borrow_mut();
                frame.page_id = None;
                frame.valid = false;
                frame.dirty = false;
            }
            inner.policy.remove_frame(frame_id);
        }
        inner.disk.deallocate(page_id)
    }

    /// Thin delegation to the disk, so the record manager doesn't need its
    /// own disk reference.
    pub fn update_block_status_on_disk(
        &mut self,
        page_id: LogicalPageId,
        status: common::BlockStatus,
    ) -> DbResult<()> {
        self.inner
            .borrow_mut()
            .disk
            .update_status(page_id, status)
    }

    /// Number of frames not currently holding a valid page.
    pub fn free_frame_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.frames.iter().filter(|f| !f.borrow().valid).count()
    }

    /// Total frame count the pool was built with.
    pub fn pool_size(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    /// Number of frames currently holding a valid page.
    pub fn buffered_page_count(&self) -> usize {
        self.inner.borrow().page_table.len()
    }
}

impl Drop for BufferPool {
    /// Flushes every dirty frame on clean shutdown. A failure here is
    /// swallowed rather than propagated, since `Drop` cannot return a
    /// `Result`; shutdown flush failures are best-effort.
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}

/// A scoped, pinned view of one page's bytes. Releases the pin on `Drop` if
/// the caller hasn't already called [`PageGuard::unpin`]. `mark_dirty` lets
/// a caller flag the page dirty ahead of (or instead of passing to) `unpin`.
pub struct PageGuard {
    inner: Rc<RefCell<Inner>>,
    frame_id: FrameId,
    page_id: LogicalPageId,
    released: bool,
}

impl PageGuard {
    pub fn page_id(&self) -> LogicalPageId {
        self.page_id
    }

    /// Read-only view of the page's `block_size` bytes.
    pub fn bytes(&self) -> Ref<'_, [u8]> {
        let inner = self.inner.borrow();
        Ref::map(inner.frames[self.frame_id].borrow(), |f| f.buf.as_slice())
    }

    /// Mutable view of the page's bytes. Does not itself mark the page
    /// dirty; call [`PageGuard::mark_dirty`] or pass `true` to
    /// [`PageGuard::unpin`]/[`BufferPool::unpin`].
    pub fn bytes_mut(&mut self) -> RefMut<'_, [u8]> {
        let inner = self.inner.borrow();
        RefMut::map(inner.frames[self.frame_id].borrow_mut(), |f| {
            f.buf.as_mut_slice()
        })
    }

    /// Marks the underlying frame dirty without waiting for `unpin`.
    pub fn mark_dirty(&mut self) {
        let inner = self.inner.borrow();
        inner.frames[self.frame_id].borrow_mut().dirty = true;
    }

    /// Explicitly releases the pin this guard holds, equivalent to (and
    /// preempting) what `Drop` would otherwise do.
    pub fn unpin(mut self, mark_dirty: bool) -> DbResult<()> {
        self.release(mark_dirty)
    }

    fn release(&mut self, mark_dirty: bool) -> DbResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut inner = self.inner.borrow_mut();
        let frame_rc = inner.frames[self.frame_id].clone();
        {
            let mut frame = frame_rc.borrow_mut();
            if frame.pin_count == 0 {
                return Err(DbError::InvalidParameter(format!(
                    "page {:?} is already unpinned",
                    self.page_id
                )));
            }
            frame.pin_count -= 1;
            if mark_dirty {
                frame.dirty = true;
            }
        }
        if frame_rc.borrow().pin_count == 0 {
            inner.policy.on_unpin(self.frame_id);
        }
        Ok(())
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let _ = self.release(false);
    }
}
