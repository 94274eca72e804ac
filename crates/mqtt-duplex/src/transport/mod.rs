//! Transport establishment and the byte stream the client runs over.

pub mod packet_io;
pub mod tcp;
pub mod tls;
pub mod websocket;

pub use packet_io::{PacketReader, PacketWriter};

use mqtt_duplex_protocol::{MqttError, Result};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use websocket::WsByteStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Tls,
    WebSocket,
    WebSocketTls,
}

/// Where and how to connect, parsed from a URL-style address such as
/// `tcp://broker:1883`, `tls://broker:8883`, or `wss://broker/mqtt`.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    /// WebSocket request path; unused for raw TCP and TLS.
    pub path: String,
}

impl TransportConfig {
    pub fn parse(address: &str) -> Result<Self> {
        let (scheme, rest) = address.split_once("://").ok_or_else(|| {
            MqttError::ConnectionError(format!(
                "address '{address}' is missing a scheme (tcp://, tls://, ws://, wss://)"
            ))
        })?;

        let kind = match scheme {
            "tcp" | "mqtt" => TransportKind::Tcp,
            "tls" | "ssl" | "mqtts" => TransportKind::Tls,
            "ws" => TransportKind::WebSocket,
            "wss" => TransportKind::WebSocketTls,
            other => {
                return Err(MqttError::ConnectionError(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, format!("/{path}")),
            None => (rest, "/mqtt".to_string()),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    MqttError::ConnectionError(format!("invalid port in '{address}'"))
                })?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), default_port(kind)),
        };

        if host.is_empty() {
            return Err(MqttError::ConnectionError(format!(
                "address '{address}' has no host"
            )));
        }

        Ok(Self {
            kind,
            host,
            port,
            path,
        })
    }

    /// Opens the transport this config describes.
    pub async fn connect(&self, timeout: Duration) -> Result<TransportStream> {
        let connect = self.connect_inner();
        tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| MqttError::Timeout)?
    }

    async fn connect_inner(&self) -> Result<TransportStream> {
        match self.kind {
            TransportKind::Tcp => {
                let stream = tcp::connect(&self.host, self.port).await?;
                Ok(TransportStream::Tcp(stream))
            }
            TransportKind::Tls => {
                let stream = tls::connect(&self.host, self.port).await?;
                Ok(TransportStream::Tls(Box::new(stream)))
            }
            TransportKind::WebSocket | TransportKind::WebSocketTls => {
                let stream = websocket::connect(self).await?;
                Ok(TransportStream::WebSocket(Box::new(stream)))
            }
        }
    }

    #[must_use]
    pub fn websocket_url(&self) -> String {
        let scheme = if self.kind == TransportKind::WebSocketTls {
            "wss"
        } else {
            "ws"
        };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

fn default_port(kind: TransportKind) -> u16 {
    match kind {
        TransportKind::Tcp => 1883,
        TransportKind::Tls => 8883,
        TransportKind::WebSocket => 80,
        TransportKind::WebSocketTls => 443,
    }
}

/// An established connection, whatever carried it.
pub enum TransportStream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    WebSocket(Box<WsByteStream>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Self::WebSocket(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Self::WebSocket(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Self::WebSocket(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Self::WebSocket(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_with_port() {
        let config = TransportConfig::parse("tcp://broker.local:2883").unwrap();
        assert_eq!(config.kind, TransportKind::Tcp);
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 2883);
    }

    #[test]
    fn test_parse_default_ports() {
        assert_eq!(TransportConfig::parse("tcp://h").unwrap().port, 1883);
        assert_eq!(TransportConfig::parse("tls://h").unwrap().port, 8883);
        assert_eq!(TransportConfig::parse("ws://h").unwrap().port, 80);
        assert_eq!(TransportConfig::parse("wss://h").unwrap().port, 443);
    }

    #[test]
    fn test_parse_websocket_path() {
        let config = TransportConfig::parse("wss://broker:9001/custom/path").unwrap();
        assert_eq!(config.kind, TransportKind::WebSocketTls);
        assert_eq!(config.path, "/custom/path");
        assert_eq!(config.websocket_url(), "wss://broker:9001/custom/path");

        let config = TransportConfig::parse("ws://broker:9001").unwrap();
        assert_eq!(config.path, "/mqtt");
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        assert!(TransportConfig::parse("broker:1883").is_err());
        assert!(TransportConfig::parse("udp://broker").is_err());
        assert!(TransportConfig::parse("tcp://broker:notaport").is_err());
        assert!(TransportConfig::parse("tcp://:1883").is_err());
    }
}
