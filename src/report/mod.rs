//! JSON snapshots of the receive pipeline

use serde::Serialize;

use crate::stats::StatsSnapshot;
use crate::types::Options;

/// JSON structure for the reorder side (internal serialization)
#[derive(Serialize)]
struct ReorderJson {
    released: u64,
    late: u64,
    duplicate: u64,
    forced_releases: u64,
    lost: u64,
    resync_requests: u64,
}

/// JSON structure for one filtered PID (internal serialization)
#[derive(Serialize)]
struct PidJson {
    pid: u16,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    units_flushed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    units_discarded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<u64>,
}

/// JSON structure for complete report (internal serialization)
#[derive(Serialize)]
struct ReportJson {
    ts_time: String,
    datagrams: u64,
    empty_datagrams: u64,
    frames_scanned: u64,
    sync_errors: u64,
    transport_errors: u64,
    continuity_errors: u64,
    sink_refusals: u64,
    reorder: ReorderJson,
    streams: Vec<PidJson>,
}

/// Report generator for receiver statistics
pub struct Reporter;

impl Reporter {
    /// Pretty-printed JSON for CLI output
    pub fn generate_json_report(opts: &Options, stats: &StatsSnapshot) -> String {
        let rep = ReportJson {
            ts_time: chrono::Utc::now().to_rfc3339(),
            datagrams: stats.datagrams,
            empty_datagrams: stats.empty_datagrams,
            frames_scanned: stats.frames_scanned,
            sync_errors: stats.sync_errors,
            transport_errors: stats.transport_errors,
            continuity_errors: stats.continuity_errors,
            sink_refusals: stats.sink_refusals,
            reorder: ReorderJson {
                released: stats.frames_released,
                late: stats.late_frames,
                duplicate: stats.duplicate_frames,
                forced_releases: stats.forced_releases,
                lost: stats.lost_frames,
                resync_requests: stats.resync_requests,
            },
            streams: vec![
                PidJson {
                    pid: opts.demux.video_pid,
                    kind: "video",
                    units_flushed: Some(stats.units_flushed),
                    units_discarded: Some(stats.units_discarded),
                    bytes: Some(stats.video_bytes),
                    packets: None,
                    errors: None,
                },
                PidJson {
                    pid: opts.demux.audio_pid,
                    kind: "audio",
                    units_flushed: None,
                    units_discarded: None,
                    bytes: None,
                    packets: Some(stats.audio_packets),
                    errors: Some(stats.audio_errors),
                },
            ],
        };
        serde_json::to_string_pretty(&rep)
            .unwrap_or_else(|_| "{\"error\": \"JSON serialization failed\"}".to_string())
    }
}
