use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bitflags::bitflags;
use bytes::Bytes;
use serde::Serialize;

use crate::constants::*;
use crate::error::ReceiverError;

/// One received datagram: framing header followed by TS packets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
    sequence: u16,
}

impl Frame {
    /// Wraps a datagram. Empty or short datagrams carry no sequence number
    /// and yield `None`.
    pub fn from_datagram(payload: Bytes) -> Option<Self> {
        if payload.len() < MIN_FRAME_HEADER_LEN {
            return None;
        }
        let sequence = u16::from_be_bytes([payload[2], payload[3]]);
        Some(Self { payload, sequence })
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Number of whole TS packets after a framing header of `header_len`
    pub fn packet_count(&self, header_len: usize) -> usize {
        self.payload.len().saturating_sub(header_len) / TS_PACKET_SIZE
    }

    /// The `index`-th TS packet after the framing header
    pub fn packet(&self, header_len: usize, index: usize) -> Option<&[u8]> {
        let start = header_len + index * TS_PACKET_SIZE;
        self.payload.get(start..start + TS_PACKET_SIZE)
    }

    /// Iterates the whole TS packets of the frame
    pub fn packets(&self, header_len: usize) -> impl Iterator<Item = &[u8]> {
        self.payload
            .get(header_len..)
            .unwrap_or_default()
            .chunks_exact(TS_PACKET_SIZE)
    }
}

bitflags! {
    /// Metadata attached to every video sink submission
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        /// First buffer after start-up or a discarded unit
        const START_TIME = 1 << 0;
        /// Continuation buffer, no timing information
        const TIME_UNKNOWN = 1 << 1;
        /// Buffer closes an access unit
        const END_OF_UNIT = 1 << 2;
        /// Stream is over
        const END_OF_STREAM = 1 << 3;
    }
}

/// Answer of a sink to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Accepted,
    /// Backpressure: the buffer was not taken
    NotReady,
}

/// States of the video unit assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitState {
    Collecting,
    Flushing,
    Error,
}

/// Settings for the demultiplexer worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DemuxConfig {
    pub video_pid: u16,
    pub audio_pid: u16,
    pub header_len: usize,
    pub audio_pes_header_len: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            video_pid: DEFAULT_VIDEO_PID,
            audio_pid: DEFAULT_AUDIO_PID,
            header_len: FRAME_HEADER_LEN,
            audio_pes_header_len: AUDIO_PES_HEADER_LEN,
        }
    }
}

/// Settings for the reorder buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReorderConfig {
    /// Pending frames above this count force the buffer past a gap
    pub force_threshold: usize,
    /// Pending count at which a resync is requested; `None` disables it
    pub resync_checkpoint: Option<usize>,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            force_threshold: FORCE_RELEASE_THRESHOLD,
            resync_checkpoint: Some(RESYNC_CHECKPOINT),
        }
    }
}

/// Configuration options for the receiver
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    pub addr: SocketAddr,
    pub recv_timeout: Duration,
    pub reorder: ReorderConfig,
    pub demux: DemuxConfig,
    /// Where resync / timeout notifications go
    pub control_addr: Option<SocketAddr>,
    pub video_out: Option<PathBuf>,
    pub audio_out: Option<PathBuf>,
    pub sink_capacity: usize,
    /// Interval of the JSON stats snapshot, 0 disables it
    pub refresh_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 1028)),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            reorder: ReorderConfig::default(),
            demux: DemuxConfig::default(),
            control_addr: None,
            video_out: None,
            audio_out: None,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            refresh_secs: 0,
        }
    }
}

impl Options {
    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if self.demux.video_pid > MAX_PID || self.demux.audio_pid > MAX_PID {
            return Err(ReceiverError::InvalidConfig(format!(
                "PIDs must be at most 0x{MAX_PID:04X}"
            )));
        }
        if self.demux.video_pid == self.demux.audio_pid {
            return Err(ReceiverError::InvalidConfig(
                "audio and video PIDs must differ".into(),
            ));
        }
        if self.demux.header_len < MIN_FRAME_HEADER_LEN
            || self.demux.header_len + TS_PACKET_SIZE > FRAME_CAPACITY
        {
            return Err(ReceiverError::InvalidConfig(format!(
                "framing header length {} out of range",
                self.demux.header_len
            )));
        }
        if self.demux.audio_pes_header_len >= TS_PACKET_SIZE - TS_HEADER_SIZE {
            return Err(ReceiverError::InvalidConfig(
                "audio PES header length exceeds a TS payload".into(),
            ));
        }
        if self.reorder.force_threshold == 0 {
            return Err(ReceiverError::InvalidConfig(
                "force threshold must be positive".into(),
            ));
        }
        if let Some(checkpoint) = self.reorder.resync_checkpoint {
            if checkpoint == 0 || checkpoint > self.reorder.force_threshold {
                return Err(ReceiverError::InvalidConfig(format!(
                    "resync checkpoint {checkpoint} must be in 1..={}",
                    self.reorder.force_threshold
                )));
            }
        }
        if self.recv_timeout.is_zero() {
            return Err(ReceiverError::InvalidConfig(
                "receive timeout must be positive".into(),
            ));
        }
        if self.sink_capacity < TS_PACKET_SIZE + VIDEO_UNIT_TRAILER.len() {
            return Err(ReceiverError::InvalidConfig(format!(
                "sink capacity {} too small",
                self.sink_capacity
            )));
        }
        Ok(())
    }
}
