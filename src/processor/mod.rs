//! TS/PES demultiplexer: the consumer side of the pipeline

mod unit;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{CONSUMER_POLL_INTERVAL, MIN_READY_FRAMES};
use crate::error::Result;
use crate::handoff::{FrameConsumer, Wait};
use crate::parsers::{TsHeader, is_pes_start};
use crate::sink::{AudioSink, VideoSink};
use crate::stats::ReceiverStats;
use crate::types::{BufferFlags, DemuxConfig, Frame, SinkStatus};

pub use unit::{Delivery, UnitOutcome, VideoUnitAssembler};

pub struct Demuxer<V, A> {
    config: DemuxConfig,
    video: VideoUnitAssembler,
    video_sink: V,
    audio_sink: A,
    stats: Arc<ReceiverStats>,
}

impl<V: VideoSink, A: AudioSink> Demuxer<V, A> {
    pub fn new(
        config: DemuxConfig,
        video_sink: V,
        audio_sink: A,
        stats: Arc<ReceiverStats>,
    ) -> Self {
        Self {
            config,
            video: VideoUnitAssembler::new(config.video_pid, config.header_len),
            video_sink,
            audio_sink,
            stats,
        }
    }

    pub fn into_sinks(self) -> (V, A) {
        (self.video_sink, self.audio_sink)
    }

    /// Consumes released frames until shutdown or until the producer is gone
    pub fn run(&mut self, rx: &mut FrameConsumer, shutdown: &CancellationToken) -> Result<()> {
        info!(
            video_pid = self.config.video_pid,
            audio_pid = self.config.audio_pid,
            "demultiplexer started"
        );
        while !shutdown.is_cancelled() {
            match rx.wait_ready(MIN_READY_FRAMES, CONSUMER_POLL_INTERVAL) {
                Wait::Ready => {}
                Wait::TimedOut => continue,
                Wait::Closed => break,
            }
            let Some(frame) = rx.take() else {
                continue;
            };
            let scanned = self.process_frame(frame);
            rx.complete();
            scanned?;
        }
        self.finish();
        info!("demultiplexer stopped");
        Ok(())
    }

    /// Scans every TS packet of one released frame
    pub fn process_frame(&mut self, frame: Frame) -> Result<()> {
        if self.video.backlog_bytes() > 0 {
            let delivery = self.video.drain(&mut self.video_sink);
            self.record_delivery(delivery);
        }

        let scan = frame.clone();
        if self.video.push_frame(frame) {
            // counted as discarded at the next start code
            warn!(seq = scan.sequence(), "video unit too long, dropping it");
        }

        for (index, packet) in scan.packets(self.config.header_len).enumerate() {
            let Some(hdr) = TsHeader::parse(packet) else {
                ReceiverStats::incr(&self.stats.sync_errors);
                continue;
            };
            if hdr.transport_error {
                ReceiverStats::incr(&self.stats.transport_errors);
            }
            if hdr.pid == self.config.video_pid {
                self.on_video_packet(index, &hdr, packet)?;
            } else if hdr.pid == self.config.audio_pid {
                self.on_audio_packet(&hdr, packet);
            }
        }
        ReceiverStats::incr(&self.stats.frames_scanned);
        Ok(())
    }

    fn on_video_packet(&mut self, index: usize, hdr: &TsHeader, packet: &[u8]) -> Result<()> {
        if !hdr.has_payload() {
            return Ok(());
        }
        if self.video.observe_continuity(hdr.continuity_counter) {
            debug!(cc = hdr.continuity_counter, "video continuity break");
            ReceiverStats::incr(&self.stats.continuity_errors);
        }
        if !is_pes_start(hdr.payload(packet)) {
            return Ok(());
        }

        match self.video.on_start_code(index, &mut self.video_sink)? {
            UnitOutcome::Flushed(delivery) => self.record_delivery(delivery),
            UnitOutcome::Discarded => {
                debug!("video unit discarded after continuity break");
                ReceiverStats::incr(&self.stats.units_discarded);
            }
            UnitOutcome::Synchronised => {
                info!("video stream synchronised");
            }
        }
        Ok(())
    }

    fn record_delivery(&self, delivery: Delivery) {
        debug!(
            bytes = delivery.bytes,
            buffers = delivery.buffers,
            units = delivery.units,
            pending = delivery.pending,
            "video delivered"
        );
        ReceiverStats::add(&self.stats.units_flushed, delivery.units as u64);
        ReceiverStats::add(&self.stats.video_bytes, delivery.bytes as u64);
        ReceiverStats::add(&self.stats.units_discarded, delivery.dropped as u64);
        if delivery.refused() {
            ReceiverStats::incr(&self.stats.sink_refusals);
        }
    }

    fn on_audio_packet(&mut self, hdr: &TsHeader, packet: &[u8]) {
        let payload = hdr.payload(packet);
        let data = if is_pes_start(payload) {
            payload
                .get(self.config.audio_pes_header_len..)
                .unwrap_or_default()
        } else {
            payload
        };
        if data.is_empty() {
            return;
        }

        match self.audio_sink.submit(data) {
            Ok(()) => ReceiverStats::incr(&self.stats.audio_packets),
            Err(e) => {
                warn!(error = %e, "audio sink error");
                ReceiverStats::incr(&self.stats.audio_errors);
            }
        }
    }

    /// Signals end of stream to a video sink that has seen data
    pub fn finish(&mut self) {
        if !self.video.negotiated() {
            return;
        }
        if self.video.backlog_bytes() > 0 {
            let delivery = self.video.drain(&mut self.video_sink);
            self.record_delivery(delivery);
            if delivery.refused() {
                warn!(pending = delivery.pending, "video backlog left undelivered");
            }
        }
        let flags = BufferFlags::TIME_UNKNOWN | BufferFlags::END_OF_STREAM;
        match self.video_sink.submit(&[], flags) {
            Ok(SinkStatus::Accepted) => {}
            Ok(SinkStatus::NotReady) => debug!("video sink not ready for end of stream"),
            Err(e) => warn!(error = %e, "video sink rejected end of stream"),
        }
    }
}
