//! TLS transport over rustls with the webpki root store.

use mqtt_duplex_protocol::{MqttError, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

pub async fn connect(host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
    let tcp = super::tcp::connect(host, port).await?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| MqttError::ConnectionError(format!("invalid TLS server name '{host}'")))?;

    let connector = TlsConnector::from(Arc::new(config));
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| MqttError::ConnectionError(format!("TLS handshake failed: {e}")))?;

    tracing::debug!(host, port, "TLS transport connected");
    Ok(stream)
}
