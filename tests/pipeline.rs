use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use mpegts_receiver::constants::VIDEO_UNIT_TRAILER;
use mpegts_receiver::handoff;
use mpegts_receiver::{
    AudioSink, BufferFlags, DemuxConfig, Demuxer, Frame, ReceiverStats, ReorderBuffer,
    ReorderConfig, SinkError, SinkStatus, VideoSink,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

const VIDEO: u16 = 0x1011;
const AUDIO: u16 = 0x1100;
const FRAMES: usize = 40;
const VIDEO_PER_FRAME: usize = 6;
const UNIT_PACKETS: usize = 10;

#[derive(Default)]
struct CollectingVideo {
    submissions: Vec<(Vec<u8>, BufferFlags)>,
}

impl VideoSink for CollectingVideo {
    fn negotiate_format(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn capacity(&self) -> usize {
        64 * 1024
    }

    fn submit(&mut self, data: &[u8], flags: BufferFlags) -> Result<SinkStatus, SinkError> {
        self.submissions.push((data.to_vec(), flags));
        Ok(SinkStatus::Accepted)
    }
}

#[derive(Default)]
struct CollectingAudio {
    packets: Vec<Vec<u8>>,
}

impl AudioSink for CollectingAudio {
    fn submit(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.packets.push(data.to_vec());
        Ok(())
    }
}

fn ts_packet(pid: u16, cc: usize, start: bool, fill: u8, stream_id: u8) -> [u8; 188] {
    let mut p = [fill; 188];
    p[0] = 0x47;
    p[1] = (if start { 0x40 } else { 0x00 }) | (pid >> 8) as u8;
    p[2] = pid as u8;
    p[3] = 0x10 | (cc & 0x0F) as u8;
    if start {
        p[4..8].copy_from_slice(&[0x00, 0x00, 0x01, stream_id]);
    }
    p
}

fn video_packet(v: usize) -> [u8; 188] {
    ts_packet(VIDEO, v, v % UNIT_PACKETS == 0, (v % 200) as u8 + 1, 0xE0)
}

fn audio_packet(a: usize) -> [u8; 188] {
    ts_packet(AUDIO, a, a % 5 == 0, 0xA0 + (a % 16) as u8, 0xC0)
}

/// Frame `i`: three video packets, one audio packet, three video packets
fn frame(i: usize) -> Frame {
    let mut raw = vec![0u8; 12];
    raw[0] = 0x80;
    raw[1] = 33;
    raw[2..4].copy_from_slice(&(i as u16).to_be_bytes());
    let first = i * VIDEO_PER_FRAME;
    for v in first..first + 3 {
        raw.extend_from_slice(&video_packet(v));
    }
    raw.extend_from_slice(&audio_packet(i));
    for v in first + 3..first + VIDEO_PER_FRAME {
        raw.extend_from_slice(&video_packet(v));
    }
    Frame::from_datagram(Bytes::from(raw)).unwrap()
}

fn expected_unit(unit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for v in unit * UNIT_PACKETS..(unit + 1) * UNIT_PACKETS {
        out.extend_from_slice(&video_packet(v)[4..]);
    }
    out.extend_from_slice(&VIDEO_UNIT_TRAILER);
    out
}

/// Pushes `order` through a reorder buffer on one thread while a demuxer
/// consumes on another. Returns the sinks and the total skipped sequences.
fn run_pipeline(order: Vec<Frame>) -> (CollectingVideo, CollectingAudio, Arc<ReceiverStats>, u64) {
    let (tx, mut rx) = handoff::channel();
    let stats = Arc::new(ReceiverStats::new());

    let consumer_stats = stats.clone();
    let consumer = thread::spawn(move || {
        let mut demux = Demuxer::new(
            DemuxConfig::default(),
            CollectingVideo::default(),
            CollectingAudio::default(),
            consumer_stats,
        );
        demux.run(&mut rx, &CancellationToken::new()).unwrap();
        demux.into_sinks()
    });

    let producer = thread::spawn(move || {
        let mut buf = ReorderBuffer::with_expected(ReorderConfig::default(), tx, 0);
        let mut skipped = 0u64;
        for f in order {
            buf.insert(f);
            skipped += u64::from(buf.release_ready().skipped);
        }
        skipped
    });

    let skipped = producer.join().unwrap();
    let (video, audio) = consumer.join().unwrap();
    (video, audio, stats, skipped)
}

#[test]
fn jittered_stream_is_demultiplexed_intact() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut order: Vec<Frame> = (0..FRAMES).map(frame).collect();
    for window in order.chunks_mut(6) {
        window.shuffle(&mut rng);
    }
    // stale copies arriving after their frame was released
    order.push(frame(3));
    order.push(frame(17));

    let (video, audio, stats, skipped) = run_pipeline(order);
    assert_eq!(skipped, 0);

    // the final frame has no successor, so it is never scanned
    let scanned_video = (FRAMES - 1) * VIDEO_PER_FRAME;
    let units = (scanned_video - 1) / UNIT_PACKETS;
    let (eos, units_out) = video.submissions.split_last().unwrap();
    assert!(eos.1.contains(BufferFlags::END_OF_STREAM));
    assert_eq!(units_out.len(), units);
    for (unit, (data, flags)) in units_out.iter().enumerate() {
        assert_eq!(data, &expected_unit(unit), "unit {unit}");
        assert!(flags.contains(BufferFlags::END_OF_UNIT));
    }
    assert!(units_out[0].1.contains(BufferFlags::START_TIME));
    assert!(units_out[1].1.contains(BufferFlags::TIME_UNKNOWN));

    assert_eq!(audio.packets.len(), FRAMES - 1);
    for (a, data) in audio.packets.iter().enumerate() {
        let payload = &audio_packet(a)[4..];
        let expected = if a % 5 == 0 { &payload[20..] } else { payload };
        assert_eq!(data.as_slice(), expected, "audio packet {a}");
    }

    let snap = stats.snapshot();
    assert_eq!(snap.units_flushed, units as u64);
    assert_eq!(snap.continuity_errors, 0);
    assert_eq!(snap.units_discarded, 0);
}

#[test]
fn lost_frame_drops_only_the_broken_unit() {
    let lost = 15;
    let order: Vec<Frame> = (0..FRAMES).filter(|&i| i != lost).map(frame).collect();

    let (video, _audio, stats, skipped) = run_pipeline(order);
    assert_eq!(skipped, 1);

    let snap = stats.snapshot();
    assert_eq!(snap.units_discarded, 1);
    assert_eq!(snap.continuity_errors, 1);

    let (_, units_out) = video.submissions.split_last().unwrap();
    let first_missing = lost * VIDEO_PER_FRAME / UNIT_PACKETS - 1;
    let resumed = first_missing + 2;
    for (i, (data, _)) in units_out[..first_missing].iter().enumerate() {
        assert_eq!(data, &expected_unit(i));
    }
    let (data, flags) = &units_out[first_missing];
    assert_eq!(data, &expected_unit(resumed));
    assert!(flags.contains(BufferFlags::START_TIME));
    assert_eq!(snap.units_flushed as usize, units_out.len());
}
