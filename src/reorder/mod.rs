//! Reorder buffer: restores sequence order of received frames.
//!
//! Frames wait here, sorted by circular sequence order, until the frame the
//! buffer expects next is at the head. Released frames move to the hand-off
//! queue. A gap that keeps more than `force_threshold` frames waiting is
//! given up on: the buffer jumps to its lowest pending sequence and the
//! skipped range is lost for good.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::handoff::FrameProducer;
use crate::seq::{distance, is_after};
use crate::types::{Frame, ReorderConfig};

/// Result of offering a frame to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Accepted,
    /// Sequence is older than the one expected next
    TooOld,
    /// Sequence is already waiting in the buffer
    Duplicate,
}

/// What one `release_ready` pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub released: usize,
    /// Sequence numbers given up on by a forced release
    pub skipped: u16,
    /// The stall reached the resync checkpoint during this pass
    pub resync: bool,
}

impl Release {
    pub fn forced(&self) -> bool {
        self.skipped > 0
    }
}

pub struct ReorderBuffer {
    pending: VecDeque<Frame>,
    expected: Option<u16>,
    config: ReorderConfig,
    resync_armed: bool,
    out: FrameProducer,
}

impl ReorderBuffer {
    /// Buffer whose expected sequence is taken from the first accepted frame
    pub fn new(config: ReorderConfig, out: FrameProducer) -> Self {
        Self {
            pending: VecDeque::with_capacity(config.force_threshold + 1),
            expected: None,
            config,
            resync_armed: true,
            out,
        }
    }

    /// Buffer that waits for `expected` first
    pub fn with_expected(config: ReorderConfig, out: FrameProducer, expected: u16) -> Self {
        let mut buf = Self::new(config, out);
        buf.expected = Some(expected);
        buf
    }

    pub fn expected(&self) -> Option<u16> {
        self.expected
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn producer(&self) -> &FrameProducer {
        &self.out
    }

    /// Sorts a frame into the pending list
    pub fn insert(&mut self, frame: Frame) -> Insert {
        let seq = frame.sequence();
        let expected = *self.expected.get_or_insert(seq);

        if is_after(expected, seq) {
            debug!(seq, expected, "drop late frame");
            return Insert::TooOld;
        }

        let mut at = self.pending.len();
        for (i, queued) in self.pending.iter().enumerate() {
            if queued.sequence() == seq {
                debug!(seq, "drop duplicate frame");
                return Insert::Duplicate;
            }
            if is_after(queued.sequence(), seq) {
                at = i;
                break;
            }
        }
        self.pending.insert(at, frame);
        Insert::Accepted
    }

    /// Moves every in-order frame at the head into the hand-off queue
    pub fn release_ready(&mut self) -> Release {
        let mut release = Release::default();
        let Some(expected) = self.expected else {
            return release;
        };
        let Some(head) = self.pending.front().map(Frame::sequence) else {
            return release;
        };

        let mut next = expected;
        if head != expected {
            if self.pending.len() > self.config.force_threshold {
                release.skipped = distance(expected, head);
                warn!(
                    expected,
                    head,
                    skipped = release.skipped,
                    pending = self.pending.len(),
                    "gap not filled in time, forcing release"
                );
                next = head;
            } else if self.resync_armed
                && self.config.resync_checkpoint == Some(self.pending.len())
            {
                self.resync_armed = false;
                release.resync = true;
                debug!(expected, pending = self.pending.len(), "requesting resync");
            }
        }

        while self.pending.front().is_some_and(|f| f.sequence() == next) {
            if let Some(frame) = self.pending.pop_front() {
                self.out.release(frame);
            }
            next = next.wrapping_add(1);
            release.released += 1;
        }
        self.expected = Some(next);

        if release.released > 0 {
            self.resync_armed = true;
        }
        release
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::{self, FrameConsumer};
    use bytes::Bytes;

    fn frame(seq: u16) -> Frame {
        let [hi, lo] = seq.to_be_bytes();
        Frame::from_datagram(Bytes::from(vec![0x80, 33, hi, lo])).unwrap()
    }

    fn drain(rx: &mut FrameConsumer) -> Vec<u16> {
        let mut out = Vec::new();
        while let Some(f) = rx.take() {
            out.push(f.sequence());
            rx.complete();
        }
        out
    }

    fn buffer_expecting(expected: u16) -> (ReorderBuffer, FrameConsumer) {
        let (tx, rx) = handoff::channel();
        (
            ReorderBuffer::with_expected(ReorderConfig::default(), tx, expected),
            rx,
        )
    }

    #[test]
    fn out_of_order_arrivals_release_ascending() {
        let (mut buf, mut rx) = buffer_expecting(3);
        let mut released = Vec::new();
        for seq in [5, 3, 4, 6] {
            assert_eq!(buf.insert(frame(seq)), Insert::Accepted);
            buf.release_ready();
            released.extend(drain(&mut rx));
        }
        assert_eq!(released, vec![3, 4, 5, 6]);
        assert_eq!(buf.expected(), Some(7));
        assert_eq!(buf.pending_count(), 0);
    }

    #[test]
    fn release_waits_for_the_gap() {
        let (mut buf, rx) = buffer_expecting(3);
        buf.insert(frame(5));
        assert_eq!(buf.release_ready().released, 0);
        assert_eq!(rx.ready_count(), 0);
        buf.insert(frame(3));
        assert_eq!(buf.release_ready().released, 1);
        assert_eq!(rx.ready_count(), 1);
    }

    #[test]
    fn first_frame_seeds_expected() {
        let (tx, mut rx) = handoff::channel();
        let mut buf = ReorderBuffer::new(ReorderConfig::default(), tx);
        assert_eq!(buf.expected(), None);
        buf.insert(frame(900));
        buf.release_ready();
        assert_eq!(drain(&mut rx), vec![900]);
        assert_eq!(buf.expected(), Some(901));
    }

    #[test]
    fn missing_frame_is_forced_past_and_then_rejected() {
        let (mut buf, mut rx) = buffer_expecting(4);
        // 5..=18: fourteen frames wait behind the hole at 4
        for seq in 5..=18 {
            buf.insert(frame(seq));
            assert!(!buf.release_ready().forced());
        }
        assert_eq!(rx.ready_count(), 0);
        assert_eq!(buf.pending_count(), 14);

        buf.insert(frame(19));
        let release = buf.release_ready();
        assert_eq!(release.skipped, 1);
        assert_eq!(release.released, 15);
        assert_eq!(drain(&mut rx), (5..=19).collect::<Vec<_>>());

        assert_eq!(buf.insert(frame(4)), Insert::TooOld);
        assert_eq!(buf.pending_count(), 0);
        assert_eq!(rx.ready_count(), 0);
    }

    #[test]
    fn duplicates_are_rejected() {
        let (mut buf, mut rx) = buffer_expecting(10);
        assert_eq!(buf.insert(frame(12)), Insert::Accepted);
        assert_eq!(buf.insert(frame(12)), Insert::Duplicate);
        buf.insert(frame(10));
        buf.release_ready();
        assert_eq!(drain(&mut rx), vec![10]);
        assert_eq!(buf.insert(frame(10)), Insert::TooOld);
        assert_eq!(buf.pending_count(), 1);
    }

    #[test]
    fn ordering_survives_wraparound() {
        let (mut buf, mut rx) = buffer_expecting(65533);
        let mut released = Vec::new();
        for seq in [65535u16, 1, 65533, 0, 65534, 2] {
            buf.insert(frame(seq));
            buf.release_ready();
            released.extend(drain(&mut rx));
        }
        assert_eq!(released, vec![65533, 65534, 65535, 0, 1, 2]);
        assert_eq!(buf.expected(), Some(3));
    }

    #[test]
    fn resync_requested_once_per_stall() {
        let (mut buf, mut rx) = buffer_expecting(0);
        let mut requests = 0;
        for seq in 1..=14 {
            buf.insert(frame(seq));
            if buf.release_ready().resync {
                requests += 1;
                assert_eq!(buf.pending_count(), 12);
            }
        }
        assert_eq!(requests, 1);

        // hole filled: everything flows and the trigger re-arms
        buf.insert(frame(0));
        assert_eq!(buf.release_ready().released, 15);
        drain(&mut rx);

        for seq in 16..=27 {
            buf.insert(frame(seq));
            if buf.release_ready().resync {
                requests += 1;
            }
        }
        assert_eq!(requests, 2);
    }

    #[test]
    fn resync_can_be_disabled() {
        let (tx, _rx) = handoff::channel();
        let config = ReorderConfig {
            resync_checkpoint: None,
            ..ReorderConfig::default()
        };
        let mut buf = ReorderBuffer::with_expected(config, tx, 0);
        for seq in 1..=14 {
            buf.insert(frame(seq));
            assert!(!buf.release_ready().resync);
        }
    }
}
