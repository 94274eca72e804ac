//! Async MQTT 3.1.1 / 5.0 client over tokio.
//!
//! The protocol engine lives in `mqtt-duplex-protocol`; this crate adds
//! the pieces that touch sockets and clocks: TCP, TLS and WebSocket
//! transports, the per-connection read/write/keepalive tasks, topic
//! callback dispatch, and the reconnect supervisor.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mqtt_duplex::{ClientConfig, MqttClient, QoS};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("tcp://localhost:1883", "sensor-hub");
//!     let client = MqttClient::connect(config).await?;
//!
//!     client.on_string("sensors/+/temperature", |value| {
//!         println!("reading: {value}");
//!     })?;
//!     client.subscribe("sensors/+/temperature", QoS::AtLeastOnce).await?;
//!
//!     client.publish("sensors/attic/temperature", b"21.5".to_vec()).await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! Addresses use URL schemes to pick the transport: `tcp://` (or
//! `mqtt://`), `tls://` (or `mqtts://`, `ssl://`), `ws://` and `wss://`.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::if_not_else)]
#![allow(clippy::cast_lossless)]

pub mod callback;
pub mod client;
pub mod testing;
pub mod transport;

pub use callback::{CallbackId, CallbackManager, MessageCallback};
pub use client::{ClientConfig, MqttClient};
pub use transport::{PacketReader, PacketWriter, TransportConfig, TransportKind, TransportStream};

pub use mqtt_duplex_protocol as protocol;
pub use mqtt_duplex_protocol::{
    connection::DisconnectReason, ConnectOptions, ConnectionState, KeepaliveConfig, Message,
    MqttError, Packet, ProtocolVersion, QoS, ReasonCode, ReconnectConfig, Result, SessionStats,
    WillMessage,
};
