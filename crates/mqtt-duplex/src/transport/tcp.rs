//! Plain TCP transport.

use mqtt_duplex_protocol::Result;
use tokio::net::TcpStream;

pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    // Control packets are small; coalescing them behind Nagle only adds
    // latency to acks and pings.
    stream.set_nodelay(true)?;
    tracing::debug!(host, port, "TCP transport connected");
    Ok(stream)
}
