//! WebSocket transport. MQTT over WebSocket frames the byte stream in
//! binary messages with the `mqtt` subprotocol; [`WsByteStream`] turns
//! that back into an ordinary `AsyncRead + AsyncWrite` stream so the
//! packet codec does not care which transport it runs over.

use bytes::{Buf, BytesMut};
use futures::{Sink, Stream};
use mqtt_duplex_protocol::{MqttError, Result};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::TransportConfig;

pub async fn connect(config: &TransportConfig) -> Result<WsByteStream> {
    let url = config.websocket_url();
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| MqttError::ConnectionError(format!("invalid WebSocket URL '{url}': {e}")))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("mqtt"));

    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| MqttError::ConnectionError(format!("WebSocket handshake failed: {e}")))?;

    tracing::debug!(url, status = ?response.status(), "WebSocket transport connected");
    Ok(WsByteStream::new(stream))
}

pub struct WsByteStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_buf: BytesMut,
}

impl WsByteStream {
    #[must_use]
    pub fn new(inner: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            inner,
            read_buf: BytesMut::new(),
        }
    }
}

fn ws_io_error(err: tokio_tungstenite::tungstenite::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl AsyncRead for WsByteStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.read_buf.is_empty() {
                let n = buf.remaining().min(this.read_buf.len());
                buf.put_slice(&this.read_buf[..n]);
                this.read_buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(WsMessage::Binary(data)))) => {
                    this.read_buf.extend_from_slice(&data);
                }
                // Pings and pongs are handled by tungstenite itself;
                // text frames are not valid MQTT-over-WebSocket.
                Poll::Ready(Some(Ok(WsMessage::Close(_)))) | Poll::Ready(None) => {
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Ok(_))) => {}
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(ws_io_error(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for WsByteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                Pin::new(&mut this.inner)
                    .start_send(WsMessage::Binary(buf.to_vec()))
                    .map_err(ws_io_error)?;
                Poll::Ready(Ok(buf.len()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(ws_io_error(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_flush(cx)
            .map_err(ws_io_error)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_close(cx)
            .map_err(ws_io_error)
    }
}
