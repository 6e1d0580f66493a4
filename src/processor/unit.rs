//! Video access-unit assembly.
//!
//! The assembler owns every frame from the start of the pending unit up to
//! the frame being scanned. A unit runs from one PES start code to the next
//! on the video PID; it is only handed to the sink when no continuity break
//! happened inside it. Frames before the scan frame are dropped once the
//! boundary decision is made. The scan frame itself is kept: its packets
//! from the boundary on belong to the next unit.
//!
//! A flushed unit is cut into sink-sized buffers and queued. Buffers the
//! sink refuses stay queued, in order, and are offered again on the next
//! drain, so backpressure delays data instead of losing it.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::constants::{MAX_BACKLOG_BYTES, MAX_UNIT_FRAMES, TS_PACKET_SIZE, VIDEO_UNIT_TRAILER};
use crate::error::{ReceiverError, Result};
use crate::parsers::{TsHeader, next_continuity};
use crate::sink::VideoSink;
use crate::types::{BufferFlags, Frame, SinkStatus, UnitState};

/// What one drain of the output queue achieved
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes the sink accepted, trailers included
    pub bytes: usize,
    pub buffers: usize,
    /// Units whose closing buffer was accepted
    pub units: usize,
    /// Bytes still queued after a refusal
    pub pending: usize,
    /// Queued units thrown away because the queue hit its limit
    pub dropped: usize,
}

impl Delivery {
    pub fn refused(&self) -> bool {
        self.pending > 0
    }
}

/// What a start code did to the pending unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Unit queued for the sink and the queue drained as far as it went
    Flushed(Delivery),
    /// Unit had a continuity break and was dropped
    Discarded,
    /// First start code seen; nothing before it is a whole unit
    Synchronised,
}

/// One sink input buffer waiting to be submitted
#[derive(Debug)]
struct Chunk {
    data: Bytes,
    end_of_unit: bool,
}

pub struct VideoUnitAssembler {
    pid: u16,
    header_len: usize,
    frames: VecDeque<Frame>,
    /// Packet index in `frames[0]` where the pending unit starts
    start_packet: usize,
    state: UnitState,
    synced: bool,
    expected_cc: Option<u8>,
    /// Next accepted submission opens a new timeline
    start_time: bool,
    negotiated: bool,
    output: VecDeque<Chunk>,
    queued_bytes: usize,
    backlog_limit: usize,
}

impl VideoUnitAssembler {
    pub fn new(pid: u16, header_len: usize) -> Self {
        Self {
            pid,
            header_len,
            frames: VecDeque::new(),
            start_packet: 0,
            state: UnitState::Collecting,
            synced: false,
            expected_cc: None,
            start_time: true,
            negotiated: false,
            output: VecDeque::new(),
            queued_bytes: 0,
            backlog_limit: MAX_BACKLOG_BYTES,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// Frames currently held (pending unit plus scan frame)
    pub fn held_frames(&self) -> usize {
        self.frames.len()
    }

    /// Bytes queued for the sink but not accepted yet
    pub fn backlog_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Makes `frame` the scan frame. Returns true when the pending unit grew
    /// past `MAX_UNIT_FRAMES` and was dropped.
    pub fn push_frame(&mut self, frame: Frame) -> bool {
        let mut overflow = false;
        if !self.synced || self.state == UnitState::Error {
            // nothing held so far can end up in a flushed unit
            self.frames.clear();
        } else if self.frames.len() >= MAX_UNIT_FRAMES {
            self.frames.clear();
            self.state = UnitState::Error;
            overflow = true;
        }
        self.frames.push_back(frame);
        overflow
    }

    /// Checks the continuity counter of a payload-bearing packet. Returns
    /// true on a break, which poisons the pending unit.
    pub fn observe_continuity(&mut self, cc: u8) -> bool {
        let broken = self.expected_cc.is_some_and(|expected| expected != cc);
        self.expected_cc = Some(next_continuity(cc));
        if broken {
            self.state = UnitState::Error;
        }
        broken
    }

    /// Handles a start code at packet `boundary` of the scan frame
    pub fn on_start_code<V>(&mut self, boundary: usize, sink: &mut V) -> Result<UnitOutcome>
    where
        V: VideoSink + ?Sized,
    {
        let outcome = if !self.synced {
            self.synced = true;
            self.state = UnitState::Collecting;
            UnitOutcome::Synchronised
        } else {
            match self.state {
                UnitState::Error => {
                    self.state = UnitState::Collecting;
                    self.start_time = true;
                    UnitOutcome::Discarded
                }
                UnitState::Collecting | UnitState::Flushing => {
                    self.state = UnitState::Flushing;
                    let flushed = self.flush(boundary, sink);
                    self.state = UnitState::Collecting;
                    UnitOutcome::Flushed(flushed?)
                }
            }
        };
        self.retire(boundary);
        Ok(outcome)
    }

    /// Offers queued buffers to the sink, oldest first, until it refuses
    pub fn drain<V>(&mut self, sink: &mut V) -> Delivery
    where
        V: VideoSink + ?Sized,
    {
        let mut delivery = Delivery::default();
        while let Some(chunk) = self.output.front() {
            let len = chunk.data.len();
            let end_of_unit = chunk.end_of_unit;
            let mut flags = if self.start_time {
                BufferFlags::START_TIME
            } else {
                BufferFlags::TIME_UNKNOWN
            };
            if end_of_unit {
                flags |= BufferFlags::END_OF_UNIT;
            }

            match sink.submit(&chunk.data, flags) {
                Ok(SinkStatus::Accepted) => {}
                Ok(SinkStatus::NotReady) => {
                    debug!(len, queued = self.queued_bytes, "video sink not ready");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, queued = self.queued_bytes, "video sink rejected buffer");
                    break;
                }
            }

            self.output.pop_front();
            self.queued_bytes -= len;
            self.start_time = false;
            delivery.bytes += len;
            delivery.buffers += 1;
            if end_of_unit {
                delivery.units += 1;
            }
        }
        delivery.pending = self.queued_bytes;
        delivery
    }

    /// Drops every frame before the scan frame; the next unit starts at
    /// `boundary`.
    fn retire(&mut self, boundary: usize) {
        let keep = self.frames.len().min(1);
        self.frames.drain(..self.frames.len() - keep);
        self.start_packet = boundary;
    }

    fn flush<V>(&mut self, boundary: usize, sink: &mut V) -> Result<Delivery>
    where
        V: VideoSink + ?Sized,
    {
        if !self.negotiated {
            sink.negotiate_format().map_err(ReceiverError::SinkSetup)?;
            self.negotiated = true;
        }

        let capacity = sink
            .capacity()
            .max(TS_PACKET_SIZE + VIDEO_UNIT_TRAILER.len());
        let mut unit = UnitWriter::new(capacity);

        let last = self.frames.len().saturating_sub(1);
        for (i, frame) in self.frames.iter().enumerate() {
            let first = if i == 0 { self.start_packet } else { 0 };
            let end = if i == last {
                boundary
            } else {
                frame.packet_count(self.header_len)
            };

            for index in first..end {
                let Some(packet) = frame.packet(self.header_len, index) else {
                    break;
                };
                let Some(hdr) = TsHeader::parse(packet) else {
                    continue;
                };
                if hdr.pid == self.pid {
                    unit.append(hdr.payload(packet));
                }
            }
        }
        unit.append(&VIDEO_UNIT_TRAILER);
        let (chunks, size) = unit.finish();

        let mut dropped = 0;
        if !self.output.is_empty() && self.queued_bytes + size > self.backlog_limit {
            dropped = self.output.iter().filter(|c| c.end_of_unit).count();
            warn!(
                queued = self.queued_bytes,
                units = dropped,
                "video sink backlog full, dropping queued units"
            );
            self.output.clear();
            self.queued_bytes = 0;
            self.start_time = true;
        }
        self.output.extend(chunks);
        self.queued_bytes += size;

        let mut delivery = self.drain(sink);
        delivery.dropped = dropped;
        Ok(delivery)
    }
}

/// Cuts one unit into buffers of at most `capacity` bytes
struct UnitWriter {
    buf: BytesMut,
    capacity: usize,
    chunks: Vec<Chunk>,
    size: usize,
}

impl UnitWriter {
    fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            chunks: Vec::new(),
            size: 0,
        }
    }

    fn append(&mut self, data: &[u8]) {
        if self.buf.len() + data.len() > self.capacity && !self.buf.is_empty() {
            self.chunks.push(Chunk {
                data: self.buf.split().freeze(),
                end_of_unit: false,
            });
        }
        self.buf.extend_from_slice(data);
        self.size += data.len();
    }

    /// Closes the unit; the last buffer carries the end-of-unit mark
    fn finish(mut self) -> (Vec<Chunk>, usize) {
        self.chunks.push(Chunk {
            data: self.buf.freeze(),
            end_of_unit: true,
        });
        (self.chunks, self.size)
    }
}
