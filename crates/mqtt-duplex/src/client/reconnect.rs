//! Reconnect supervisor: waits for link-down signals and re-dials with
//! exponential backoff until the connection is back or the retry
//! policy gives up.

use super::{establish_connection, ClientInner};
use mqtt_duplex_protocol::connection::{ConnectionEvent, ConnectionState, DisconnectReason};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(super) async fn supervisor(
    inner: Arc<ClientInner>,
    mut link_rx: mpsc::Receiver<DisconnectReason>,
) {
    while let Some(reason) = link_rx.recv().await {
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }
        // A signal from a connection that has already been replaced.
        if inner.connected.load(Ordering::SeqCst) {
            tracing::debug!(?reason, "ignoring stale link-down signal");
            continue;
        }

        tracing::warn!(?reason, "connection lost");
        if inner
            .state_machine
            .lock()
            .transition(ConnectionEvent::ConnectionLost { reason })
            .is_err()
        {
            continue;
        }

        reconnect_loop(&inner).await;

        if inner.state_machine.lock().state().is_closed() {
            tracing::error!("giving up on reconnecting");
            break;
        }
    }
}

async fn reconnect_loop(inner: &Arc<ClientInner>) {
    loop {
        let Some(delay) = inner.state_machine.lock().next_retry_delay() else {
            return;
        };
        let attempt = match inner.state_machine.lock().state() {
            ConnectionState::ConnectionFailure { attempt } => *attempt,
            _ => return,
        };

        tracing::info!(attempt, ?delay, "reconnecting after delay");
        tokio::time::sleep(delay).await;
        if inner.closing.load(Ordering::SeqCst) {
            return;
        }

        if inner
            .state_machine
            .lock()
            .transition(ConnectionEvent::ConnectRequested)
            .is_err()
        {
            return;
        }

        match establish_connection(inner).await {
            Ok(()) => {
                tracing::info!(attempt, "reconnected");
                return;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                let lost = ConnectionEvent::ConnectionLost {
                    reason: DisconnectReason::NetworkError(e.to_string()),
                };
                if inner.state_machine.lock().transition(lost).is_err() {
                    return;
                }
            }
        }
    }
}
