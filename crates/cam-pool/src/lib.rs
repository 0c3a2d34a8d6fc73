//! Grow-on-demand object pool for high-rate frame handling.
//!
//! Per-frame heap allocation is prohibitively expensive at camera rates
//! (an 8 MB frame at 100 FPS means allocating close to a gigabyte per
//! second), so frames are pre-constructed once and recycled through a
//! [`FramePool`].
//!
//! # Design
//!
//! Unlike a semaphore-backed pool, `acquire()` never blocks and never
//! fails: if the free queue is empty a fresh object is built with the
//! factory closure and the growth is logged as backpressure. Objects
//! move *by value* out of and back into the pool, so exclusive access
//! while loaned out is guaranteed by ownership and a double release is
//! unrepresentable.
//!
//! Growth past the configured ceiling is still honored (dropping a
//! frame on the hot path would be worse) but escalates the log level.
//!
//! # Example
//!
//! ```
//! use cam_pool::FramePool;
//!
//! let pool = FramePool::new(4, 1000, || vec![0u8; 1024]);
//! let buf = pool.acquire();
//! assert_eq!(buf.len(), 1024);
//! pool.release(buf);
//! ```

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Factory closure used to construct new pool entries.
type FactoryFn<T> = Box<dyn Fn() -> T + Send + Sync>;

struct PoolInner<T> {
    free: VecDeque<T>,
    /// Objects handed out and not yet released.
    outstanding: usize,
    /// Every object ever constructed for this pool.
    total_created: usize,
}

/// Thread-safe pool of pre-constructed objects.
///
/// All operations take one short internal lock; none of them block
/// waiting for a free object.
pub struct FramePool<T> {
    inner: Mutex<PoolInner<T>>,
    factory: FactoryFn<T>,
    initial_size: usize,
    ceiling: usize,
}

impl<T: Send + 'static> FramePool<T> {
    /// Create a pool with `size` pre-constructed entries.
    ///
    /// `ceiling` caps *expected* growth: the pool keeps allocating past
    /// it rather than fail, but logs at error level because sustained
    /// growth means frames are produced faster than consumed.
    pub fn new<F>(size: usize, ceiling: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let free: VecDeque<T> = (0..size).map(|_| factory()).collect();

        info!(pool_size = size, ceiling, "frame pool created");

        Self {
            inner: Mutex::new(PoolInner {
                free,
                outstanding: 0,
                total_created: size,
            }),
            factory: Box::new(factory),
            initial_size: size,
            ceiling,
        }
    }

    /// Pop a free object, or construct a fresh one if the pool is empty.
    ///
    /// Never blocks. Growth is logged; growth past the ceiling is an
    /// error-level backpressure signal.
    pub fn acquire(&self) -> T {
        let mut inner = self.inner.lock();

        let obj = match inner.free.pop_front() {
            Some(obj) => obj,
            None => {
                inner.total_created += 1;
                if inner.total_created > self.ceiling {
                    error!(
                        total = inner.total_created,
                        ceiling = self.ceiling,
                        "pool exhausted past growth ceiling, allocating anyway"
                    );
                } else {
                    warn!(
                        total = inner.total_created,
                        initial = self.initial_size,
                        "pool empty, allocating"
                    );
                }
                (self.factory)()
            }
        };
        inner.outstanding += 1;
        obj
    }

    /// Return an object to the free queue. O(1).
    pub fn release(&self, obj: T) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        inner.free.push_back(obj);
    }

    /// Top the free queue up to at least `size` entries.
    pub fn ensure_size(&self, size: usize) {
        let mut inner = self.inner.lock();
        if inner.free.len() < size {
            debug!(
                free = inner.free.len(),
                requested = size,
                "topping up frame pool"
            );
        }
        while inner.free.len() < size {
            let obj = (self.factory)();
            inner.free.push_back(obj);
            inner.total_created += 1;
        }
    }

    /// Number of free objects currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// True if no free objects are pooled right now.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().free.is_empty()
    }

    /// Objects currently loaned out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Every object constructed over the pool lifetime.
    #[must_use]
    pub fn total_created(&self) -> usize {
        self.inner.lock().total_created
    }

    /// Size the pool was created with.
    #[must_use]
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }
}
