use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::{Instant, Interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ReceiverError, Result};
use crate::handoff;
use crate::ingest::FrameReceiver;
use crate::network::{ControlNotifier, bind_receiver};
use crate::processor::Demuxer;
use crate::reorder::ReorderBuffer;
use crate::report::Reporter;
use crate::sink::{AudioSink, FileAudioSink, FileVideoSink, NullSink, VideoSink};
use crate::stats::ReceiverStats;
use crate::types::Options;

pub type BoxedVideoSink = Box<dyn VideoSink + Send>;
pub type BoxedAudioSink = Box<dyn AudioSink + Send>;

/// File sinks where an output path is set, null sinks elsewhere
pub fn build_sinks(opts: &Options) -> Result<(BoxedVideoSink, BoxedAudioSink)> {
    let video: BoxedVideoSink = match &opts.video_out {
        Some(path) => Box::new(
            FileVideoSink::create(path, opts.sink_capacity).map_err(ReceiverError::SinkSetup)?,
        ),
        None => Box::new(NullSink::with_capacity(opts.sink_capacity)),
    };
    let audio: BoxedAudioSink = match &opts.audio_out {
        Some(path) => Box::new(FileAudioSink::create(path).map_err(ReceiverError::SinkSetup)?),
        None => Box::new(NullSink::default()),
    };
    Ok((video, audio))
}

/// Which side stopped the pipeline first
enum Finished {
    Interrupted,
    Receiver(Result<()>),
    Demuxer(Result<()>),
}

/// Runs the receiver task and the demultiplexer thread until one of them
/// stops or Ctrl-C arrives, then shuts the other one down. `sinks` is only
/// called once `opts` has been validated.
pub async fn run<V, A, F>(opts: Options, sinks: F) -> Result<()>
where
    V: VideoSink + Send + 'static,
    A: AudioSink + Send + 'static,
    F: FnOnce(&Options) -> Result<(V, A)>,
{
    opts.validate()?;
    let (video_sink, audio_sink) = sinks(&opts)?;
    let opts = Arc::new(opts);
    match serde_json::to_string(&*opts) {
        Ok(config) => info!(%config, "starting receiver"),
        Err(e) => warn!(error = %e, "could not render configuration"),
    }

    let socket = bind_receiver(opts.addr)?;
    let notifier = match opts.control_addr {
        Some(addr) => Some(ControlNotifier::connect(addr).await?),
        None => None,
    };
    if let Some(n) = &notifier {
        info!(control = %n.target(), "control messages enabled");
    }

    let stats = Arc::new(ReceiverStats::new());
    let shutdown = CancellationToken::new();
    let (tx, mut rx) = handoff::channel();

    let receiver = FrameReceiver::new(
        socket,
        ReorderBuffer::new(opts.reorder, tx),
        notifier,
        opts.recv_timeout,
        stats.clone(),
    );
    let mut receiver_task = tokio::spawn(receiver.run(shutdown.clone()));

    let mut demuxer = Demuxer::new(opts.demux, video_sink, audio_sink, stats.clone());
    let token = shutdown.clone();
    let mut demux_task = tokio::task::spawn_blocking(move || demuxer.run(&mut rx, &token));

    let mut report = (opts.refresh_secs > 0).then(|| {
        let period = Duration::from_secs(opts.refresh_secs);
        interval_at(Instant::now() + period, period)
    });
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let finished = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Finished::Interrupted,
            joined = &mut receiver_task => break Finished::Receiver(flatten(joined, "receiver")),
            joined = &mut demux_task => break Finished::Demuxer(flatten(joined, "demultiplexer")),
            _ = tick(&mut report) => {
                println!("{}", Reporter::generate_json_report(&opts, &stats.snapshot()));
            }
        }
    };

    shutdown.cancel();
    let (received, demuxed) = match finished {
        Finished::Interrupted => {
            info!("interrupted, shutting down");
            (
                flatten(receiver_task.await, "receiver"),
                flatten(demux_task.await, "demultiplexer"),
            )
        }
        Finished::Receiver(r) => (r, flatten(demux_task.await, "demultiplexer")),
        Finished::Demuxer(r) => (flatten(receiver_task.await, "receiver"), r),
    };

    let snapshot = stats.snapshot();
    info!(
        datagrams = snapshot.datagrams,
        lost = snapshot.lost_frames,
        units = snapshot.units_flushed,
        "receiver stopped"
    );
    if let Err(e) = &received {
        error!(error = %e, "receiver failed");
    }
    if let Err(e) = &demuxed {
        error!(error = %e, "demultiplexer failed");
    }
    received.and(demuxed)
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>, worker: &str) -> Result<()> {
    joined.map_err(|e| ReceiverError::Worker(format!("{worker}: {e}")))?
}

async fn tick(report: &mut Option<Interval>) {
    match report {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
