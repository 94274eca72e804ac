#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::if_not_else)]
#![allow(clippy::cast_lossless)]

//! Sans-io MQTT 3.1.1 / 5.0 protocol engine.
//!
//! This crate contains everything that does not touch a socket: the
//! bit-exact wire codec for all fifteen control packets (both protocol
//! versions), the variable byte integer and UTF-8 string encodings, the
//! wildcard topic matching trie, the per-connection session state
//! machine tracking in-flight QoS 1/2 flows, and the connection
//! lifecycle state machine with its reconnect policy. The companion
//! `mqtt-duplex` crate drives it over tokio transports.

pub mod connection;
pub mod encoding;
pub mod error;
pub mod keepalive;
pub mod packet;
pub mod packet_id;
pub mod protocol;
pub mod session;
pub mod topic;
pub mod types;

pub use connection::{ConnectionEvent, ConnectionState, ConnectionStateMachine, ReconnectConfig};
pub use error::{MqttError, MqttWarning, Result};
pub use keepalive::{KeepaliveConfig, KeepaliveTracker};
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use packet_id::PacketIdAllocator;
pub use protocol::v5::properties::{Properties, PropertyId, PropertyValue};
pub use protocol::v5::reason_codes::ReasonCode;
pub use session::{SessionAction, SessionState, SessionStats};
pub use topic::{
    topic_matches_filter, validate_topic_filter, validate_topic_name, TopicTrie,
};
pub use types::{ConnectOptions, Message, ProtocolVersion, QoS, WillMessage};
