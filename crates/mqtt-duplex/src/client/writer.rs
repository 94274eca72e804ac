//! Per-connection write loop. All outbound packets funnel through one
//! channel so writes never interleave on the stream.

use super::ClientInner;
use crate::transport::{PacketWriter, TransportStream};
use mqtt_duplex_protocol::connection::DisconnectReason;
use mqtt_duplex_protocol::{MqttError, Packet};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;

pub(super) async fn run(
    mut writer: PacketWriter<WriteHalf<TransportStream>>,
    mut rx: mpsc::Receiver<Packet>,
    inner: Arc<ClientInner>,
) {
    // Writes carry the same deadline as reads. A peer that stops
    // draining its receive window stalls our writes indefinitely
    // otherwise.
    let write_deadline = {
        let tracker = inner.keepalive.lock();
        if tracker.enabled() {
            Some(inner.config.keepalive.timeout_duration(tracker.keepalive()))
        } else {
            None
        }
    };

    while let Some(packet) = rx.recv().await {
        tracing::trace!(packet_type = ?packet.packet_type(), "writing packet");
        let result = match write_deadline {
            Some(deadline) => {
                match tokio::time::timeout(deadline, writer.write_packet(&packet)).await {
                    Ok(result) => result,
                    Err(_) => Err(MqttError::Timeout),
                }
            }
            None => writer.write_packet(&packet).await,
        };

        match result {
            Ok(()) => {
                inner.keepalive.lock().record_outbound(Instant::now());
            }
            Err(MqttError::Timeout) => {
                tracing::warn!("write stalled past the keep alive window");
                inner.signal_link_down(DisconnectReason::NetworkError(
                    "write timed out".to_string(),
                ));
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "write failed");
                inner.signal_link_down(DisconnectReason::NetworkError(e.to_string()));
                return;
            }
        }
    }

    // Every sender dropped: orderly shutdown.
    let _ = writer.shutdown().await;
}
