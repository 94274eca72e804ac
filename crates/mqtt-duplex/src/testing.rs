//! In-process broker for integration tests.
//!
//! Speaks just enough MQTT 5.0 to exercise the client: it accepts
//! connections in a loop (so reconnects land back on it), acknowledges
//! flows, and routes published messages back to matching
//! subscriptions. Fault injection is limited to what the tests need.

use crate::transport::{PacketReader, PacketWriter};
use mqtt_duplex_protocol::packet::{
    ConnAckPacket, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket,
    SubAckPacket, UnsubAckPacket,
};
use mqtt_duplex_protocol::protocol::v5::reason_codes::GRANTED_QOS_0;
use mqtt_duplex_protocol::{topic_matches_filter, Packet, ProtocolVersion, QoS, ReasonCode};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// `session_present` answered on the second and later connections.
    pub session_present_on_reconnect: bool,
    /// Swallow PINGREQ to provoke a keep alive timeout.
    pub ignore_pings: bool,
    /// Close the first connection after reading this many packets,
    /// without acknowledging the last one.
    pub drop_first_connection_after: Option<usize>,
    /// After CONNACK, stop reading from the socket entirely while
    /// still sending periodic PINGRESPs. The client's receive path
    /// stays healthy but its writes back up once the TCP window fills.
    pub stall_reads: bool,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            session_present_on_reconnect: true,
            ignore_pings: false,
            drop_first_connection_after: None,
            stall_reads: false,
        }
    }
}

pub struct TestBroker {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<PublishPacket>>>,
    handle: JoinHandle<()>,
}

impl TestBroker {
    pub async fn start() -> Self {
        Self::start_with(BrokerOptions::default()).await
    }

    pub async fn start_with(options: BrokerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test broker");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = Arc::clone(&received);
        let handle = tokio::spawn(async move {
            let mut connection_index = 0usize;
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let _ = stream.set_nodelay(true);
                serve_connection(
                    stream,
                    &options,
                    &received_clone,
                    connection_index,
                )
                .await;
                connection_index += 1;
            }
        });

        Self {
            addr,
            received,
            handle,
        }
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    /// Every PUBLISH the broker has read, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<PublishPacket> {
        self.received.lock().clone()
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Connection {
    writer: PacketWriter<WriteHalf<TcpStream>>,
    subscriptions: Vec<(String, QoS)>,
    next_packet_id: u16,
}

impl Connection {
    async fn send(&mut self, packet: Packet) -> bool {
        self.writer.write_packet(&packet).await.is_ok()
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }
}

async fn serve_connection(
    stream: TcpStream,
    options: &BrokerOptions,
    received: &Arc<Mutex<Vec<PublishPacket>>>,
    connection_index: usize,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader: PacketReader<ReadHalf<TcpStream>> =
        PacketReader::new(read_half, ProtocolVersion::V5);
    let mut conn = Connection {
        writer: PacketWriter::new(write_half),
        subscriptions: Vec::new(),
        next_packet_id: 1,
    };

    let mut packets_read = 0usize;
    loop {
        let Ok(packet) = reader.read_packet().await else {
            return;
        };
        packets_read += 1;

        let dropping = connection_index == 0
            && options
                .drop_first_connection_after
                .map_or(false, |n| packets_read >= n);
        if dropping {
            // Record the packet but never acknowledge it.
            if let Packet::Publish(publish) = packet {
                received.lock().push(publish);
            }
            return;
        }

        match packet {
            Packet::Connect(_) => {
                let session_present =
                    connection_index > 0 && options.session_present_on_reconnect;
                let connack = ConnAckPacket::new(session_present, ReasonCode::Success);
                if !conn.send(Packet::ConnAck(connack)).await {
                    return;
                }
                if options.stall_reads {
                    // Keep the client's reader fed so only its writer
                    // can notice anything is wrong.
                    loop {
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        if !conn.send(Packet::PingResp).await {
                            return;
                        }
                    }
                }
            }
            Packet::Publish(publish) => {
                received.lock().push(publish.clone());
                if !acknowledge_publish(&mut conn, &publish).await {
                    return;
                }
                if !route_to_subscribers(&mut conn, &publish).await {
                    return;
                }
            }
            Packet::PubRel(pubrel) => {
                let pubcomp = PubCompPacket::new(pubrel.packet_id);
                if !conn.send(Packet::PubComp(pubcomp)).await {
                    return;
                }
            }
            Packet::PubRec(pubrec) => {
                let pubrel = PubRelPacket::new(pubrec.packet_id);
                if !conn.send(Packet::PubRel(pubrel)).await {
                    return;
                }
            }
            Packet::PubAck(_) | Packet::PubComp(_) => {}
            Packet::Subscribe(subscribe) => {
                let mut codes = Vec::new();
                for filter in &subscribe.filters {
                    conn.subscriptions
                        .push((filter.filter.clone(), filter.options.qos));
                    codes.push(granted_code(filter.options.qos));
                }
                let suback = SubAckPacket::new(subscribe.packet_id, codes);
                if !conn.send(Packet::SubAck(suback)).await {
                    return;
                }
            }
            Packet::Unsubscribe(unsubscribe) => {
                let codes = unsubscribe
                    .filters
                    .iter()
                    .map(|filter| {
                        conn.subscriptions.retain(|(f, _)| f != filter);
                        ReasonCode::Success
                    })
                    .collect();
                let unsuback = UnsubAckPacket::new(unsubscribe.packet_id, codes);
                if !conn.send(Packet::UnsubAck(unsuback)).await {
                    return;
                }
            }
            Packet::PingReq => {
                if !options.ignore_pings && !conn.send(Packet::PingResp).await {
                    return;
                }
            }
            Packet::Disconnect(_) => return,
            _ => {}
        }
    }
}

async fn acknowledge_publish(conn: &mut Connection, publish: &PublishPacket) -> bool {
    match (publish.qos, publish.packet_id) {
        (QoS::AtLeastOnce, Some(id)) => conn.send(Packet::PubAck(PubAckPacket::new(id))).await,
        (QoS::ExactlyOnce, Some(id)) => conn.send(Packet::PubRec(PubRecPacket::new(id))).await,
        _ => true,
    }
}

async fn route_to_subscribers(conn: &mut Connection, publish: &PublishPacket) -> bool {
    let matching: Vec<QoS> = conn
        .subscriptions
        .iter()
        .filter(|(filter, _)| topic_matches_filter(&publish.topic, filter))
        .map(|(_, qos)| *qos)
        .collect();

    for sub_qos in matching {
        let qos = if (publish.qos as u8) < (sub_qos as u8) {
            publish.qos
        } else {
            sub_qos
        };
        let mut outbound = PublishPacket::new(publish.topic.clone(), publish.payload.clone());
        if qos != QoS::AtMostOnce {
            let id = conn.allocate_id();
            outbound = outbound.with_qos(qos, id);
        }
        if !conn.send(Packet::Publish(outbound)).await {
            return false;
        }
    }
    true
}

fn granted_code(qos: QoS) -> ReasonCode {
    match qos {
        QoS::AtMostOnce => GRANTED_QOS_0,
        QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
        QoS::ExactlyOnce => ReasonCode::GrantedQoS2,
    }
}
