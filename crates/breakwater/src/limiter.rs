//! Concurrency limiter with a bounded, fair waiting queue.
//!
//! At most `max_in_flight` permits exist. When none is free, callers wait in
//! a FIFO queue bounded by `max_queue`, for at most the enqueue timeout.
//! A released permit is handed directly to the queue head rather than
//! returned to the free pool, so a latecomer can never overtake a waiter.

use crate::error::Error;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Point-in-time view of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub in_flight: usize,
    pub queue_depth: usize,
    pub max_in_flight: usize,
    pub max_queue: usize,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    in_flight: usize,
    queue: VecDeque<Waiter>,
    next_waiter_id: u64,
}

struct Inner {
    max_in_flight: usize,
    max_queue: usize,
    enqueue_timeout: Duration,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("limiter state poisoned")
    }

    fn release(&self) {
        let mut state = self.lock();
        // Hand the permit straight to the first waiter that is still
        // listening; `in_flight` is unchanged because ownership transfers.
        while let Some(waiter) = state.queue.pop_front() {
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
        assert!(
            state.in_flight > 0,
            "permit released with nothing in flight"
        );
        state.in_flight -= 1;
    }
}

/// Limits the number of concurrently executing requests.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

/// Outcome of a synchronous admission attempt.
pub enum Admission {
    /// A permit was free; the caller may proceed immediately.
    Granted(Permit),
    /// All permits are taken; the caller holds a queue slot and must
    /// [`Waiting::wait`] for hand-off.
    Queued(Waiting),
    /// All permits are taken and the queue is at capacity.
    QueueFull,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `max_in_flight` permits and a queue of at
    /// most `max_queue` waiters, each waiting up to `enqueue_timeout`.
    ///
    /// # Panics
    ///
    /// Panics if `max_in_flight` is zero or `enqueue_timeout` is zero.
    pub fn new(max_in_flight: usize, max_queue: usize, enqueue_timeout: Duration) -> Self {
        assert!(max_in_flight > 0, "max_in_flight must be at least 1");
        assert!(
            enqueue_timeout > Duration::ZERO,
            "enqueue_timeout must be positive"
        );
        Self {
            inner: Arc::new(Inner {
                max_in_flight,
                max_queue,
                enqueue_timeout,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Attempts admission without suspending.
    ///
    /// Either grants a permit, enqueues a waiter, or reports the queue
    /// full — all decided synchronously under the state lock.
    pub fn try_admit(&self) -> Admission {
        let mut state = self.inner.lock();
        if state.in_flight < self.inner.max_in_flight {
            state.in_flight += 1;
            return Admission::Granted(Permit {
                inner: Arc::clone(&self.inner),
            });
        }
        if state.queue.len() >= self.inner.max_queue {
            return Admission::QueueFull;
        }
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.queue.push_back(Waiter { id, tx });
        let queue_depth = state.queue.len();
        Admission::Queued(Waiting {
            inner: Arc::clone(&self.inner),
            id,
            rx,
            queue_depth,
            settled: false,
        })
    }

    /// Admission as one suspending call: resolves with a permit, or fails
    /// with [`Error::QueueFull`] / [`Error::QueueTimeout`].
    pub async fn acquire(&self) -> Result<Permit, Error> {
        match self.try_admit() {
            Admission::Granted(permit) => Ok(permit),
            Admission::QueueFull => Err(Error::QueueFull {
                max_queue: self.inner.max_queue,
            }),
            Admission::Queued(waiting) => waiting.wait().await,
        }
    }

    /// Configured enqueue timeout.
    pub fn enqueue_timeout(&self) -> Duration {
        self.inner.enqueue_timeout
    }

    /// Configured queue bound.
    pub fn max_queue(&self) -> usize {
        self.inner.max_queue
    }

    /// Current counters and bounds.
    pub fn snapshot(&self) -> LimiterSnapshot {
        let state = self.inner.lock();
        LimiterSnapshot {
            in_flight: state.in_flight,
            queue_depth: state.queue.len(),
            max_in_flight: self.inner.max_in_flight,
            max_queue: self.inner.max_queue,
        }
    }
}

impl fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ConcurrencyLimiter")
            .field("in_flight", &snapshot.in_flight)
            .field("queue_depth", &snapshot.queue_depth)
            .field("max_in_flight", &snapshot.max_in_flight)
            .field("max_queue", &snapshot.max_queue)
            .finish()
    }
}

/// One in-flight slot. Dropping it releases the slot, handing it to the
/// queue head if anyone is waiting.
pub struct Permit {
    inner: Arc<Inner>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Permit")
    }
}

/// A held queue slot. Await [`Waiting::wait`] for the hand-off; dropping it
/// instead removes the slot from the queue without consuming a permit.
pub struct Waiting {
    inner: Arc<Inner>,
    id: u64,
    rx: oneshot::Receiver<()>,
    queue_depth: usize,
    settled: bool,
}

impl Waiting {
    /// Queue depth observed right after this waiter enqueued.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Waits for a permit hand-off, up to the enqueue timeout.
    pub async fn wait(mut self) -> Result<Permit, Error> {
        let timeout = self.inner.enqueue_timeout;
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        match outcome {
            Ok(Ok(())) => {
                self.settled = true;
                Ok(Permit {
                    inner: Arc::clone(&self.inner),
                })
            }
            // The sender is only dropped once this waiter has left the
            // queue, so a closed channel means the slot is already gone.
            Ok(Err(_)) => {
                self.settled = true;
                Err(Error::QueueTimeout { waited: timeout })
            }
            Err(_elapsed) => {
                let removed = {
                    let mut state = self.inner.lock();
                    match state.queue.iter().position(|w| w.id == self.id) {
                        Some(index) => {
                            state.queue.remove(index);
                            true
                        }
                        None => false,
                    }
                };
                self.settled = true;
                if removed {
                    return Err(Error::QueueTimeout { waited: timeout });
                }
                // A hand-off raced the timer: the grant is already in the
                // channel and the permit is ours.
                match self.rx.try_recv() {
                    Ok(()) => Ok(Permit {
                        inner: Arc::clone(&self.inner),
                    }),
                    Err(_) => Err(Error::QueueTimeout { waited: timeout }),
                }
            }
        }
    }
}

impl Drop for Waiting {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let removed = {
            let mut state = self.inner.lock();
            match state.queue.iter().position(|w| w.id == self.id) {
                Some(index) => {
                    state.queue.remove(index);
                    true
                }
                None => false,
            }
        };
        if removed {
            return;
        }
        // No longer queued: a hand-off already delivered the grant. Pass
        // the permit on so it is not lost with this receiver.
        if self.rx.try_recv().is_ok() {
            self.inner.release();
        }
    }
}

impl fmt::Debug for Waiting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiting").field("id", &self.id).finish()
    }
}
