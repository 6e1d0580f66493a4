use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mpegts_receiver::constants::{
    AUDIO_PES_HEADER_LEN, DEFAULT_BIND_ADDR, DEFAULT_SINK_CAPACITY, FORCE_RELEASE_THRESHOLD,
    FRAME_HEADER_LEN, RESYNC_CHECKPOINT,
};
use mpegts_receiver::receiver::{Options, run};
use mpegts_receiver::{DemuxConfig, ReorderConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Receives a sequence-numbered MPEG-TS stream over UDP and demultiplexes it")]
struct Opt {
    /// UDP socket to bind + listen (IPv4, unicast or multicast)
    #[clap(long, default_value = DEFAULT_BIND_ADDR)]
    addr: SocketAddr,

    /// Seconds without a datagram, once the stream started, before giving up
    #[clap(long, default_value_t = 10)]
    timeout: u64,

    /// Pending frames that force the reorder buffer past a gap
    #[clap(long, default_value_t = FORCE_RELEASE_THRESHOLD)]
    threshold: usize,

    /// Pending frames at which a resync is requested, 0 disables it
    #[clap(long, default_value_t = RESYNC_CHECKPOINT)]
    checkpoint: usize,

    /// Video PID (hex)
    #[clap(long, default_value = "1011", value_parser = parse_pid)]
    video_pid: u16,

    /// Audio PID (hex)
    #[clap(long, default_value = "1100", value_parser = parse_pid)]
    audio_pid: u16,

    /// Bytes of framing header in front of the TS packets
    #[clap(long, default_value_t = FRAME_HEADER_LEN)]
    header_len: usize,

    /// Bytes skipped at the start of an audio PES
    #[clap(long, default_value_t = AUDIO_PES_HEADER_LEN)]
    audio_header_len: usize,

    /// Where to send resync and timeout notifications
    #[clap(long)]
    control: Option<SocketAddr>,

    /// Dump the video elementary stream to this file
    #[clap(long)]
    video_out: Option<PathBuf>,

    /// Dump raw audio payload to this file
    #[clap(long)]
    audio_out: Option<PathBuf>,

    /// Video sink buffer size in bytes
    #[clap(long, default_value_t = DEFAULT_SINK_CAPACITY)]
    sink_capacity: usize,

    /// Refresh interval for the JSON snapshot, 0 disables it
    #[clap(long, default_value_t = 2)]
    refresh: u64,
}

fn parse_pid(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid PID {s:?}: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opt = Opt::parse();

    run(Options {
        addr: opt.addr,
        recv_timeout: Duration::from_secs(opt.timeout),
        reorder: ReorderConfig {
            force_threshold: opt.threshold,
            resync_checkpoint: (opt.checkpoint > 0).then_some(opt.checkpoint),
        },
        demux: DemuxConfig {
            video_pid: opt.video_pid,
            audio_pid: opt.audio_pid,
            header_len: opt.header_len,
            audio_pes_header_len: opt.audio_header_len,
        },
        control_addr: opt.control,
        video_out: opt.video_out,
        audio_out: opt.audio_out,
        sink_capacity: opt.sink_capacity,
        refresh_secs: opt.refresh,
    })
    .await
}
