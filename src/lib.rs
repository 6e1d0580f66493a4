// src/lib.rs
pub mod receiver {
    pub use crate::types::Options;

    use crate::sink::{AudioSink, VideoSink};

    /// Async entry-point with sinks picked from `opts`; returns when stopped
    /// (Ctrl-C, receive timeout or a fatal sink error)
    pub async fn run(opts: Options) -> anyhow::Result<()> {
        crate::core::run(opts, crate::core::build_sinks).await?;
        Ok(())
    }

    /// Same as [`run`] with caller-provided sinks
    pub async fn run_with_sinks<V, A>(opts: Options, video: V, audio: A) -> anyhow::Result<()>
    where
        V: VideoSink + Send + 'static,
        A: AudioSink + Send + 'static,
    {
        crate::core::run(opts, move |_| Ok((video, audio))).await?;
        Ok(())
    }
}

pub mod constants;
pub mod error;
pub mod handoff;
pub mod ingest;
pub mod network;
pub mod parsers;
pub mod processor;
pub mod reorder;
pub mod report;
pub mod seq;
pub mod sink;
pub mod stats;
pub mod types;
mod core;

pub use error::{ReceiverError, Result, SinkError};
pub use handoff::{FrameConsumer, FrameProducer, Wait};
pub use processor::Demuxer;
pub use reorder::{Insert, Release, ReorderBuffer};
pub use sink::{AudioSink, FileAudioSink, FileVideoSink, NullSink, VideoSink};
pub use stats::{ReceiverStats, StatsSnapshot};
pub use types::{BufferFlags, DemuxConfig, Frame, Options, ReorderConfig, SinkStatus, UnitState};
