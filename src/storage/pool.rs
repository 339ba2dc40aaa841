//! Reader Pool
//!
//! Fixed set of read-only handles on a type's data file, plus the
//! engine-wide permits that bound how many readers hold one at a time.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

use crate::error::{KvError, Result};

/// Pre-opened read handles on one data file
///
/// ## Concurrency:
/// - `free`: lock-free queue of idle slot indices (checkout/checkin)
/// - `slots`: one Mutex per handle, uncontended since a slot has one owner
/// - Counters are atomics, used for instrumentation only
pub struct ReaderPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    slots: Vec<Mutex<File>>,
    free: ArrayQueue<usize>,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

impl ReaderPool {
    /// Open `size` independent read handles on `path`
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KvError::Config("reader pool needs at least one handle".to_string()));
        }

        let free = ArrayQueue::new(size);
        let mut slots = Vec::with_capacity(size);
        for slot in 0..size {
            let file = OpenOptions::new()
                .read(true)
                .open(path)
                .map_err(|e| KvError::unavailable(path, e))?;
            slots.push(Mutex::new(file));
            // Capacity equals `size`, so this cannot overflow
            let _ = free.push(slot);
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                free,
                in_use: AtomicUsize::new(0),
                peak_in_use: AtomicUsize::new(0),
            }),
        })
    }

    /// Check out an idle handle
    ///
    /// Never waits: callers hold a [`Permit`] first, which keeps the number
    /// of concurrent checkouts within the pool size.
    pub fn acquire(&self) -> Result<PooledReader> {
        let slot = self.inner.free.pop().ok_or_else(|| {
            KvError::ReaderPoolExhausted(format!(
                "all {} read handles are checked out",
                self.capacity()
            ))
        })?;

        let now = self.inner.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_use.fetch_max(now, Ordering::SeqCst);

        Ok(PooledReader {
            inner: Arc::clone(&self.inner),
            slot,
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Handles currently checked out
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous checkouts seen so far
    pub fn peak_in_use(&self) -> usize {
        self.inner.peak_in_use.load(Ordering::SeqCst)
    }
}

/// A checked-out read handle; returned to the pool on drop
pub struct PooledReader {
    inner: Arc<PoolInner>,
    slot: usize,
}

impl PooledReader {
    /// Position the handle at `offset` and hand a buffered reader to `f`
    pub fn read_at<T>(
        &mut self,
        offset: u64,
        f: impl FnOnce(&mut BufReader<&mut File>) -> Result<T>,
    ) -> Result<T> {
        let mut file = self.inner.slots[self.slot].lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(&mut *file);
        f(&mut reader)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        self.inner.in_use.fetch_sub(1, Ordering::SeqCst);
        let _ = self.inner.free.push(self.slot);
    }
}

// =============================================================================
// Read Permits
// =============================================================================

/// Counting semaphore bounding concurrent pooled reads engine-wide
///
/// Holders are tracked per thread. A thread that already holds a permit
/// (for example inside a live [`Engine::find_all`](crate::Engine::find_all)
/// scan) never waits for another one: it takes a free permit or fails with
/// [`KvError::ReaderPoolExhausted`], since waiting on itself would never end.
pub struct ReadPermits {
    state: Mutex<PermitState>,
    released: Condvar,
    capacity: usize,
}

struct PermitState {
    available: usize,
    held_by: HashMap<ThreadId, usize>,
}

impl PermitState {
    fn grant(&mut self, thread: ThreadId) {
        self.available -= 1;
        *self.held_by.entry(thread).or_insert(0) += 1;
    }
}

impl ReadPermits {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PermitState {
                available: capacity,
                held_by: HashMap::new(),
            }),
            released: Condvar::new(),
            capacity,
        }
    }

    /// Block until a permit is free
    ///
    /// Fails instead of blocking when the calling thread already holds a
    /// permit and none is free.
    pub fn acquire(&self) -> Result<Permit<'_>> {
        let thread = thread::current().id();
        let mut state = self.state.lock();

        if state.held_by.contains_key(&thread) {
            if state.available == 0 {
                return Err(KvError::ReaderPoolExhausted(format!(
                    "nested read while this thread holds a permit; all {} are in use",
                    self.capacity
                )));
            }
        } else {
            while state.available == 0 {
                self.released.wait(&mut state);
            }
        }

        state.grant(thread);
        Ok(Permit {
            permits: self,
            thread,
        })
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        if state.available == 0 {
            return None;
        }
        state.grant(thread);
        Some(Permit {
            permits: self,
            thread,
        })
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Permits held by the calling thread
    pub fn held_by_current_thread(&self) -> usize {
        let thread = thread::current().id();
        self.state.lock().held_by.get(&thread).copied().unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A held read permit; released on drop
pub struct Permit<'a> {
    permits: &'a ReadPermits,
    thread: ThreadId,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.permits.state.lock();
        state.available += 1;
        if let Some(count) = state.held_by.get_mut(&self.thread) {
            *count -= 1;
            if *count == 0 {
                state.held_by.remove(&self.thread);
            }
        }
        self.permits.released.notify_one();
    }
}
