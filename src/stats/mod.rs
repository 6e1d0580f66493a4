//! Counters shared by the receive and demultiplex workers

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        /// Live counters, updated lock-free from both workers
        #[derive(Debug, Default)]
        pub struct ReceiverStats {
            $($(#[$doc])* pub $name: AtomicU64,)*
        }

        /// Point-in-time copy of [`ReceiverStats`]
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
        }

        impl ReceiverStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    /// Datagrams read from the socket
    datagrams,
    /// Zero-length or truncated datagrams
    empty_datagrams,
    /// Frames handed to the demultiplexer in order
    frames_released,
    /// Frames older than the expected sequence
    late_frames,
    duplicate_frames,
    /// Gaps given up on
    forced_releases,
    /// Sequence numbers skipped by forced releases
    lost_frames,
    resync_requests,
    frames_scanned,
    sync_errors,
    /// Packets with the transport error indicator set
    transport_errors,
    continuity_errors,
    units_flushed,
    units_discarded,
    sink_refusals,
    video_bytes,
    audio_packets,
    audio_errors,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to a counter
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }
}
