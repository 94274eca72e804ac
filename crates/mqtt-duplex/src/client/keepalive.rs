//! Keep alive scheduling task: sends PINGREQ when the connection has
//! been quiet for the ping interval. Timeout detection lives in the
//! read loop's deadline.

use super::ClientInner;
use mqtt_duplex_protocol::connection::DisconnectReason;
use mqtt_duplex_protocol::Packet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub(super) async fn run(
    inner: Arc<ClientInner>,
    generation: u64,
    writer_tx: mpsc::Sender<Packet>,
) {
    loop {
        let Some(deadline) = inner.keepalive.lock().next_deadline() else {
            // Keep alive disabled for this connection.
            return;
        };

        // Floor keeps a deadline that raced into the past from
        // spinning the loop.
        let target = deadline.max(Instant::now() + Duration::from_millis(10));
        tokio::time::sleep_until(tokio::time::Instant::from_std(target)).await;

        if inner.generation.load(Ordering::SeqCst) != generation
            || !inner.connected.load(Ordering::SeqCst)
        {
            return;
        }

        let now = Instant::now();
        let (should_ping, timed_out) = {
            let tracker = inner.keepalive.lock();
            (tracker.should_ping(now), tracker.is_timed_out(now))
        };

        if timed_out {
            tracing::warn!("keep alive timed out waiting for PINGRESP");
            inner.signal_link_down(DisconnectReason::KeepAliveTimeout);
            return;
        }

        if should_ping {
            if writer_tx.send(Packet::PingReq).await.is_err() {
                return;
            }
            inner.keepalive.lock().ping_sent(Instant::now());
            tracing::trace!("PINGREQ");
        }
    }
}
