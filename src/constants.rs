//! Constants for the framed MPEG-TS receive path

use std::time::Duration;

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_HEADER_SIZE: usize = 4;

/// PES packet constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Framing header (RTP-style) constants
pub const FRAME_HEADER_LEN: usize = 12;
pub const MIN_FRAME_HEADER_LEN: usize = 4;
pub const FRAME_CAPACITY: usize = 2048; // receive buffer per datagram

/// Circular 16-bit sequence space
pub const SEQ_HALF_RANGE: i32 = 32768;

/// Reorder thresholds
pub const FORCE_RELEASE_THRESHOLD: usize = 14; // pending frames before giving up on a gap
pub const RESYNC_CHECKPOINT: usize = 12; // pending frames before asking for a keyframe

/// Default PIDs (Wi-Fi Display sources)
pub const DEFAULT_VIDEO_PID: u16 = 0x1011;
pub const DEFAULT_AUDIO_PID: u16 = 0x1100;
pub const MAX_PID: u16 = 0x1FFF;

/// Bytes skipped at an audio PES start (PES header + LPCM private header)
pub const AUDIO_PES_HEADER_LEN: usize = 20;

/// Marker appended to every complete video unit
pub const VIDEO_UNIT_TRAILER: [u8; 14] = [
    0xea, 0x00, 0x00, 0x00, 0x01, 0xce, 0x8c, 0x4d, 0x9d, 0x10, 0x8e, 0x25, 0xe9, 0xfe,
];

/// Default video sink input buffer size
pub const DEFAULT_SINK_CAPACITY: usize = 80 * 1024;

/// Units longer than this many frames are dropped as broken
pub const MAX_UNIT_FRAMES: usize = 4096;

/// Video bytes held for a refusing sink before queued units are dropped
pub const MAX_BACKLOG_BYTES: usize = 4 * 1024 * 1024;

/// Consumer needs this many released frames before it scans one
pub const MIN_READY_FRAMES: usize = 2;
pub const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Network defaults
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:1028";
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Control path messages
pub const RESYNC_MESSAGE: &[u8] = b"send idr";
pub const TIMEOUT_MESSAGE: &[u8] = b"recv timeout";
