//! Downstream media sinks.
//!
//! The decoder and the audio device live outside this crate. The video sink
//! takes elementary-stream buffers tagged with [`BufferFlags`] and may
//! refuse one under backpressure; the audio sink takes raw payload per TS
//! packet and never reports backpressure.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::constants::DEFAULT_SINK_CAPACITY;
use crate::error::SinkError;
use crate::types::{BufferFlags, SinkStatus};

pub trait VideoSink {
    /// One-time handshake before the first submission
    fn negotiate_format(&mut self) -> Result<(), SinkError>;

    /// Size of one input buffer
    fn capacity(&self) -> usize;

    fn submit(&mut self, data: &[u8], flags: BufferFlags) -> Result<SinkStatus, SinkError>;
}

pub trait AudioSink {
    fn submit(&mut self, data: &[u8]) -> Result<(), SinkError>;
}

impl<T: VideoSink + ?Sized> VideoSink for Box<T> {
    fn negotiate_format(&mut self) -> Result<(), SinkError> {
        (**self).negotiate_format()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn submit(&mut self, data: &[u8], flags: BufferFlags) -> Result<SinkStatus, SinkError> {
        (**self).submit(data, flags)
    }
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn submit(&mut self, data: &[u8]) -> Result<(), SinkError> {
        (**self).submit(data)
    }
}

/// Accepts and drops everything
#[derive(Debug, Clone, Copy)]
pub struct NullSink {
    capacity: usize,
}

impl Default for NullSink {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl NullSink {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl VideoSink for NullSink {
    fn negotiate_format(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn submit(&mut self, _data: &[u8], _flags: BufferFlags) -> Result<SinkStatus, SinkError> {
        Ok(SinkStatus::Accepted)
    }
}

impl AudioSink for NullSink {
    fn submit(&mut self, _data: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes the video elementary stream to a file
pub struct FileVideoSink {
    out: BufWriter<File>,
    capacity: usize,
}

impl FileVideoSink {
    pub fn create(path: &Path, capacity: usize) -> Result<Self, SinkError> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            capacity,
        })
    }
}

impl VideoSink for FileVideoSink {
    fn negotiate_format(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn submit(&mut self, data: &[u8], flags: BufferFlags) -> Result<SinkStatus, SinkError> {
        self.out.write_all(data)?;
        if flags.intersects(BufferFlags::END_OF_UNIT | BufferFlags::END_OF_STREAM) {
            self.out.flush()?;
        }
        Ok(SinkStatus::Accepted)
    }
}

/// Writes raw audio payload to a file
pub struct FileAudioSink {
    out: BufWriter<File>,
}

impl FileAudioSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }
}

impl AudioSink for FileAudioSink {
    fn submit(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.out.write_all(data)?;
        Ok(())
    }
}
