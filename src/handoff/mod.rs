//! Single-producer / single-consumer hand-off of released frames.
//!
//! The reorder buffer pushes frames here once they are in delivery order;
//! the demultiplexer takes them one at a time. `ready` counts frames that
//! were released and not yet fully scanned: the producer bumps it after the
//! push, the consumer lowers it after it is done with a frame. A frame that
//! has been taken but not completed still counts as ready.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::types::Frame;

/// Outcome of waiting for released frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Ready,
    TimedOut,
    /// Producer is gone; remaining frames can still be taken
    Closed,
}

struct Shared {
    queue: Mutex<VecDeque<Frame>>,
    available: Condvar,
    ready: AtomicUsize,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // a panicking peer cannot leave the deque half-modified
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Creates a connected producer / consumer pair
pub fn channel() -> (FrameProducer, FrameConsumer) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        available: Condvar::new(),
        ready: AtomicUsize::new(0),
        closed: AtomicBool::new(false),
    });
    (
        FrameProducer {
            shared: shared.clone(),
        },
        FrameConsumer {
            shared,
            in_scan: false,
        },
    )
}

/// Release side, owned by the frame receiver
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Hands a frame to the consumer. The push is visible before the count.
    pub fn release(&self, frame: Frame) {
        let mut queue = self.shared.lock();
        queue.push_back(frame);
        // counted under the lock so a waiting consumer cannot miss the wakeup
        self.shared.ready.fetch_add(1, Ordering::Release);
        drop(queue);
        self.shared.available.notify_one();
    }

    pub fn ready_count(&self) -> usize {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Wakes the consumer and tells it no more frames will come
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        // take the lock so a consumer between its check and its wait sees the flag
        drop(self.shared.lock());
        self.shared.available.notify_all();
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scan side, owned by the demultiplexer
pub struct FrameConsumer {
    shared: Arc<Shared>,
    in_scan: bool,
}

impl FrameConsumer {
    pub fn ready_count(&self) -> usize {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Blocks until at least `min` frames are ready, the producer closes,
    /// or `timeout` elapses.
    pub fn wait_ready(&self, min: usize, timeout: Duration) -> Wait {
        let guard = self.shared.lock();
        let (_guard, result) = self
            .shared
            .available
            .wait_timeout_while(guard, timeout, |_| {
                self.ready_count() < min && !self.is_closed()
            })
            .unwrap_or_else(|e| e.into_inner());

        if self.ready_count() >= min {
            Wait::Ready
        } else if self.is_closed() {
            Wait::Closed
        } else {
            debug_assert!(result.timed_out());
            Wait::TimedOut
        }
    }

    /// Takes the oldest released frame for scanning. The frame keeps
    /// counting as ready until [`complete`](Self::complete) is called.
    pub fn take(&mut self) -> Option<Frame> {
        debug_assert!(!self.in_scan, "previous frame not completed");
        let frame = self.shared.lock().pop_front();
        self.in_scan = frame.is_some();
        frame
    }

    /// Marks the frame returned by the last `take` as fully scanned
    pub fn complete(&mut self) {
        if std::mem::take(&mut self.in_scan) {
            self.shared.ready.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Frames released but not yet taken
    pub fn queued(&self) -> usize {
        self.shared.lock().len()
    }
}
