//! Fair, fixed-capacity permit pool bounding concurrently open files.
//!
//! # Invariants
//!
//! - **Bounded**: at most `capacity` permits are outstanding at any time.
//! - **Fair**: blocked callers are served strictly in arrival order, so a steady stream of
//!   new callers can never starve an earlier one.
//! - **Leak-free**: a [`Permit`] returns its capacity when dropped, on every exit path
//!   including unwinding. A permit can only be released by the value that owns it, so a
//!   double release cannot be expressed.
//!
//! The pool throttles the raw number of open files. It knows nothing about which file a
//! permit was taken for.
//!
//! ```
//! use readall::ConcurrencyLimiter;
//!
//! let limiter = ConcurrencyLimiter::new(2);
//! let a = limiter.acquire();
//! let b = limiter.acquire();
//! assert!(limiter.try_acquire().is_none());
//! drop(a);
//! assert_eq!(limiter.available(), 1);
//! b.release();
//! assert_eq!(limiter.available(), 2);
//! ```

use crate::cancel::CancelToken;
use crate::config::DEFAULT_CONCURRENCY_LIMIT;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often a cancellable waiter re-checks its token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Process-wide pools by capacity. Entries die with the last reader holding them.
static SHARED: Mutex<BTreeMap<usize, Weak<ConcurrencyLimiter>>> = Mutex::new(BTreeMap::new());

#[derive(Debug)]
struct State {
    available: usize,
    /// Tickets of blocked callers, oldest first.
    queue: VecDeque<u64>,
    next_ticket: u64,
}

pub struct ConcurrencyLimiter {
    capacity: usize,
    state: Mutex<State>,
    cv: Condvar,
}

impl ConcurrencyLimiter {
    /// Create a pool with `capacity` permits.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "ConcurrencyLimiter capacity must be > 0");
        Arc::new(Self {
            capacity,
            state: Mutex::new(State {
                available: capacity,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            cv: Condvar::new(),
        })
    }

    /// The process-wide pool of ten permits, shared by every reader that is not given its
    /// own limiter.
    pub fn global() -> Arc<Self> {
        Self::shared(DEFAULT_CONCURRENCY_LIMIT)
    }

    /// The process-wide pool with exactly `capacity` permits.
    ///
    /// Every caller asking for the same capacity gets the same pool, so transforms that
    /// agree on a limit bound their open files together. A caller asking for a different
    /// capacity gets a different pool and is never handed a bound it did not ask for.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn shared(capacity: usize) -> Arc<Self> {
        let mut pools = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(limiter) = pools.get(&capacity).and_then(Weak::upgrade) {
            return limiter;
        }
        pools.retain(|_, pool| pool.strong_count() > 0);
        let limiter = Self::new(capacity);
        pools.insert(capacity, Arc::downgrade(&limiter));
        debug!(capacity, pools = pools.len(), "process-wide limiter created");
        limiter
    }

    /// Lock state with poison recovery.
    ///
    /// Permits are released from `Drop`, possibly while unwinding. Panicking there would
    /// abort the process, and the counter itself is never left half-updated.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of free permits. Stale as soon as it is returned.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().available
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Number of callers currently blocked waiting for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.lock().queue.len()
    }

    /// Take a permit without blocking. Fails if any caller is already queued, so an
    /// opportunistic caller cannot jump the line.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut st = self.lock();
        if Self::take_uncontended(&mut st) {
            drop(st);
            return Some(self.permit());
        }
        None
    }

    /// Block until a permit is available.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut st = self.lock();
        if !Self::take_uncontended(&mut st) {
            let ticket = Self::enqueue(&mut st);
            while !self.take_turn(&mut st, ticket) {
                st = self.cv.wait(st).unwrap_or_else(PoisonError::into_inner);
            }
        }
        drop(st);
        self.permit()
    }

    /// Block for at most `timeout`. Returns `None` if no permit freed up in time; the
    /// caller leaves the queue without consuming capacity.
    #[must_use]
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let deadline = Instant::now() + timeout;
        self.acquire_or_give_up(
            || Instant::now() >= deadline,
            || deadline.saturating_duration_since(Instant::now()),
        )
    }

    /// Block until a permit is available or `cancel` fires.
    #[must_use]
    pub fn acquire_cancellable(self: &Arc<Self>, cancel: &CancelToken) -> Option<Permit> {
        if cancel.is_cancelled() {
            return None;
        }
        self.acquire_or_give_up(|| cancel.is_cancelled(), || CANCEL_POLL)
    }

    /// Queue for a permit, re-checking `give_up` after every wait of at most `next_wait()`.
    fn acquire_or_give_up(
        self: &Arc<Self>,
        give_up: impl Fn() -> bool,
        next_wait: impl Fn() -> Duration,
    ) -> Option<Permit> {
        let mut st = self.lock();
        if !Self::take_uncontended(&mut st) {
            let ticket = Self::enqueue(&mut st);
            while !self.take_turn(&mut st, ticket) {
                if give_up() {
                    st.queue.retain(|t| *t != ticket);
                    // The head may have changed; let the new head re-check.
                    self.cv.notify_all();
                    return None;
                }
                st = self
                    .cv
                    .wait_timeout(st, next_wait())
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
        drop(st);
        Some(self.permit())
    }

    /// Take a free permit if nobody is queued ahead.
    fn take_uncontended(st: &mut State) -> bool {
        if st.queue.is_empty() && st.available > 0 {
            st.available -= 1;
            return true;
        }
        false
    }

    fn enqueue(st: &mut State) -> u64 {
        let ticket = st.next_ticket;
        st.next_ticket += 1;
        st.queue.push_back(ticket);
        ticket
    }

    /// Take a permit if `ticket` heads the queue and one is free.
    fn take_turn(&self, st: &mut State, ticket: u64) -> bool {
        if st.queue.front() != Some(&ticket) || st.available == 0 {
            return false;
        }
        st.queue.pop_front();
        st.available -= 1;
        // Another permit may still be free for the next in line.
        if st.available > 0 && !st.queue.is_empty() {
            self.cv.notify_all();
        }
        true
    }

    fn permit(self: &Arc<Self>) -> Permit {
        Permit {
            limiter: Arc::clone(self),
        }
    }

    fn release_one(&self) {
        let mut st = self.lock();
        debug_assert!(
            st.available < self.capacity,
            "permit released into a full pool"
        );
        st.available = (st.available + 1).min(self.capacity);
        let wake = !st.queue.is_empty();
        drop(st);
        if wake {
            self.cv.notify_all();
        }
    }
}

impl fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("ConcurrencyLimiter")
            .field("capacity", &self.capacity)
            .field("available", &st.available)
            .field("waiting", &st.queue.len())
            .finish()
    }
}

/// One unit of capacity drawn from a [`ConcurrencyLimiter`]. Returned on drop.
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Permit {
    /// Return the permit now. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release_one();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("capacity", &self.limiter.capacity)
            .finish()
    }
}
