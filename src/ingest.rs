//! Producer side: socket reads into the reorder buffer

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::constants::FRAME_CAPACITY;
use crate::error::{ReceiverError, Result};
use crate::network::ControlNotifier;
use crate::reorder::{Insert, ReorderBuffer};
use crate::stats::ReceiverStats;
use crate::types::Frame;

pub struct FrameReceiver {
    socket: UdpSocket,
    reorder: ReorderBuffer,
    notifier: Option<ControlNotifier>,
    recv_timeout: Duration,
    stats: Arc<ReceiverStats>,
}

impl FrameReceiver {
    pub fn new(
        socket: UdpSocket,
        reorder: ReorderBuffer,
        notifier: Option<ControlNotifier>,
        recv_timeout: Duration,
        stats: Arc<ReceiverStats>,
    ) -> Self {
        Self {
            socket,
            reorder,
            notifier,
            recv_timeout,
            stats,
        }
    }

    /// Receives until `shutdown` fires or the stream goes silent. The
    /// hand-off is closed on every exit path.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = [0u8; FRAME_CAPACITY];
        let mut started = false;
        info!(addr = ?self.socket.local_addr().ok(), "frame receiver started");

        let result = loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => None,
                r = self.next_datagram(&mut buf, started) => Some(r),
            };
            let Some(received) = received else {
                break Ok(());
            };

            match received {
                Ok(n) => {
                    started = true;
                    self.on_datagram(&buf[..n]).await;
                }
                Err(e @ ReceiverError::ReceiveTimeout(_)) => {
                    error!(timeout = ?self.recv_timeout, "stream went silent");
                    if let Some(notifier) = &self.notifier {
                        notifier.report_timeout().await;
                    }
                    break Err(e);
                }
                Err(e) => break Err(e),
            }
        };

        self.reorder.producer().close();
        info!(pending = self.reorder.pending_count(), "frame receiver stopped");
        result
    }

    /// Waits for a datagram; only bounded once the stream has started
    async fn next_datagram(&self, buf: &mut [u8], bounded: bool) -> Result<usize> {
        if !bounded {
            return Ok(self.socket.recv(buf).await?);
        }
        match tokio::time::timeout(self.recv_timeout, self.socket.recv(buf)).await {
            Ok(received) => Ok(received?),
            Err(_) => Err(ReceiverError::ReceiveTimeout(self.recv_timeout)),
        }
    }

    async fn on_datagram(&mut self, data: &[u8]) {
        ReceiverStats::incr(&self.stats.datagrams);
        let Some(frame) = Frame::from_datagram(Bytes::copy_from_slice(data)) else {
            ReceiverStats::incr(&self.stats.empty_datagrams);
            return;
        };

        match self.reorder.insert(frame) {
            Insert::Accepted => {}
            Insert::TooOld => {
                ReceiverStats::incr(&self.stats.late_frames);
                return;
            }
            Insert::Duplicate => {
                ReceiverStats::incr(&self.stats.duplicate_frames);
                return;
            }
        }

        let release = self.reorder.release_ready();
        ReceiverStats::add(&self.stats.frames_released, release.released as u64);
        if release.forced() {
            ReceiverStats::incr(&self.stats.forced_releases);
            ReceiverStats::add(&self.stats.lost_frames, u64::from(release.skipped));
        }
        if release.resync {
            ReceiverStats::incr(&self.stats.resync_requests);
            match &self.notifier {
                Some(notifier) => notifier.request_resync().await,
                None => debug!("resync wanted, no control address configured"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FRAME_HEADER_LEN;
    use crate::handoff::{self, FrameConsumer};
    use crate::network::bind_receiver;
    use crate::types::ReorderConfig;
    use tokio::time::{sleep, timeout};

    fn datagram(seq: u16) -> Vec<u8> {
        let mut v = vec![0u8; FRAME_HEADER_LEN];
        v[0] = 0x80;
        v[1] = 33;
        v[2..4].copy_from_slice(&seq.to_be_bytes());
        v
    }

    fn receiver(
        recv_timeout: Duration,
        notifier: Option<ControlNotifier>,
    ) -> (FrameReceiver, FrameConsumer, Arc<ReceiverStats>) {
        let socket = bind_receiver("127.0.0.1:0".parse().unwrap()).unwrap();
        let (tx, rx) = handoff::channel();
        let stats = Arc::new(ReceiverStats::new());
        let reorder = ReorderBuffer::new(ReorderConfig::default(), tx);
        (
            FrameReceiver::new(socket, reorder, notifier, recv_timeout, stats.clone()),
            rx,
            stats,
        )
    }

    #[tokio::test]
    async fn datagrams_come_out_in_sequence_order() {
        let (rcv, mut rx, stats) = receiver(Duration::from_secs(5), None);
        let addr = rcv.socket.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(rcv.run(shutdown.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for seq in [10u16, 12, 11, 11, 9, 13] {
            sender.send_to(&datagram(seq), addr).await.unwrap();
        }
        sender.send_to(&[], addr).await.unwrap();

        timeout(Duration::from_secs(2), async {
            while stats.snapshot().datagrams < 7 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert!(rx.is_closed());
        let mut seen = Vec::new();
        while let Some(f) = rx.take() {
            seen.push(f.sequence());
            rx.complete();
        }
        assert_eq!(seen, vec![10, 11, 12, 13]);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_released, 4);
        assert_eq!(snap.late_frames, 2);
        assert_eq!(snap.empty_datagrams, 1);
    }

    #[tokio::test]
    async fn silence_after_first_datagram_is_fatal() {
        let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let notifier = ControlNotifier::connect(control.local_addr().unwrap())
            .await
            .unwrap();
        let (rcv, rx, _) = receiver(Duration::from_millis(50), Some(notifier));
        let addr = rcv.socket.local_addr().unwrap();
        let task = tokio::spawn(rcv.run(CancellationToken::new()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&datagram(1), addr).await.unwrap();

        let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(ReceiverError::ReceiveTimeout(_))));
        assert!(rx.is_closed());

        let mut buf = [0u8; 32];
        let (n, _) = timeout(Duration::from_secs(2), control.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"recv timeout");
    }

    #[tokio::test]
    async fn wait_before_first_datagram_is_unbounded() {
        let (rcv, _rx, _) = receiver(Duration::from_millis(20), None);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(rcv.run(shutdown.clone()));

        sleep(Duration::from_millis(100)).await;
        assert!(!task.is_finished());
        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
