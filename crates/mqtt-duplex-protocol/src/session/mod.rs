//! Per-connection session state: in-flight QoS 1/2 flows, pending
//! subscriptions, the offline publish backlog, and resumption after a
//! reconnect.
//!
//! The state machine is pure. Every input returns a list of
//! [`SessionAction`]s; the caller owns the socket and the clock.

pub mod queue;

pub use queue::{PendingQueue, QueueResult, QueueStats};

use crate::error::Result;
use crate::packet::{
    Packet, PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket,
    SubAckPacket, SubscribePacket, SubscriptionOptions, TopicFilter, UnsubAckPacket,
    UnsubscribePacket,
};
use crate::packet_id::PacketIdAllocator;
use crate::protocol::v5::reason_codes::ReasonCode;
use crate::topic::{validate_topic_filter, validate_topic_name};
use crate::types::{Message, ProtocolVersion, QoS};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// What the caller must do in response to an input. Actions are
/// ordered; packets must go on the wire in the order given.
#[derive(Debug, Clone)]
pub enum SessionAction {
    SendPacket(Packet),
    DeliverMessage(Message),
    PublishCompleted {
        packet_id: u16,
        reason_code: ReasonCode,
    },
    SubscribeCompleted {
        packet_id: u16,
        reason_codes: Vec<ReasonCode>,
    },
    UnsubscribeCompleted {
        packet_id: u16,
        reason_codes: Vec<ReasonCode>,
    },
    /// A flow broke: an error reason code from the peer, or an ack for
    /// a packet id with no matching flow.
    FlowError {
        packet_id: u16,
        reason_code: ReasonCode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// QoS 1/2 publishes sent, ack not yet received.
    pub in_flight_outbound: usize,
    /// PUBRELs sent, PUBCOMP not yet received.
    pub awaiting_pubcomp: usize,
    /// Inbound QoS 2 publishes delivered, PUBREL not yet received.
    pub awaiting_release_inbound: usize,
    pub unacked_subscribes: usize,
    pub unacked_unsubscribes: usize,
    pub pending_messages: usize,
    pub active_subscriptions: usize,
}

#[derive(Debug)]
pub struct SessionState {
    protocol_version: ProtocolVersion,
    allocator: PacketIdAllocator,

    // Outbound flows. A packet id lives in exactly one of these two.
    sent_not_acked: HashMap<u16, PublishPacket>,
    pubrel_not_comped: HashMap<u16, PubRelPacket>,

    // Inbound QoS 2 flows, keyed by the sender's packet id space.
    received_not_released: HashSet<u16>,

    unacknowledged_subscribes: HashMap<u16, SubscribePacket>,
    unacknowledged_unsubscribes: HashMap<u16, UnsubscribePacket>,

    /// Acknowledged filters, kept so a fresh session can resubscribe.
    subscriptions: HashMap<String, SubscriptionOptions>,

    pending: PendingQueue,
}

impl SessionState {
    #[must_use]
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self::with_queue(protocol_version, PendingQueue::default())
    }

    #[must_use]
    pub fn with_queue(protocol_version: ProtocolVersion, pending: PendingQueue) -> Self {
        Self {
            protocol_version,
            allocator: PacketIdAllocator::new(),
            sent_not_acked: HashMap::new(),
            pubrel_not_comped: HashMap::new(),
            received_not_released: HashSet::new(),
            unacknowledged_subscribes: HashMap::new(),
            unacknowledged_unsubscribes: HashMap::new(),
            subscriptions: HashMap::new(),
            pending,
        }
    }

    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Builds and tracks an outbound publish.
    pub fn publish(&mut self, message: &Message) -> Result<Vec<SessionAction>> {
        validate_topic_name(&message.topic)?;

        let mut packet = PublishPacket::from_message(message, self.protocol_version);
        if message.qos != QoS::AtMostOnce {
            let packet_id = self.allocator.allocate()?;
            packet = packet.with_qos(message.qos, packet_id);
            self.sent_not_acked.insert(packet_id, packet.clone());
        }

        Ok(vec![SessionAction::SendPacket(Packet::Publish(packet))])
    }

    /// Builds and tracks an outbound SUBSCRIBE for `filters`.
    pub fn subscribe(&mut self, filters: Vec<TopicFilter>) -> Result<Vec<SessionAction>> {
        for filter in &filters {
            validate_topic_filter(&filter.filter)?;
        }

        let packet_id = self.allocator.allocate()?;
        let mut packet = SubscribePacket::new(packet_id).with_version(self.protocol_version);
        for filter in filters {
            packet = packet.add_filter_with_options(filter);
        }
        self.unacknowledged_subscribes
            .insert(packet_id, packet.clone());

        Ok(vec![SessionAction::SendPacket(Packet::Subscribe(packet))])
    }

    /// Builds and tracks an outbound UNSUBSCRIBE for `filters`.
    pub fn unsubscribe(&mut self, filters: Vec<String>) -> Result<Vec<SessionAction>> {
        for filter in &filters {
            validate_topic_filter(filter)?;
        }

        let packet_id = self.allocator.allocate()?;
        let mut packet = UnsubscribePacket::new(packet_id).with_version(self.protocol_version);
        for filter in filters {
            packet = packet.add_filter(filter);
        }
        self.unacknowledged_unsubscribes
            .insert(packet_id, packet.clone());

        Ok(vec![SessionAction::SendPacket(Packet::Unsubscribe(
            packet,
        ))])
    }

    /// Feeds one inbound packet through the state machine.
    #[must_use]
    pub fn handle_incoming(&mut self, packet: &Packet) -> Vec<SessionAction> {
        match packet {
            Packet::Publish(publish) => self.handle_publish(publish),
            Packet::PubAck(puback) => self.handle_puback(puback),
            Packet::PubRec(pubrec) => self.handle_pubrec(pubrec),
            Packet::PubRel(pubrel) => self.handle_pubrel(pubrel),
            Packet::PubComp(pubcomp) => self.handle_pubcomp(pubcomp),
            Packet::SubAck(suback) => self.handle_suback(suback),
            Packet::UnsubAck(unsuback) => self.handle_unsuback(unsuback),
            _ => Vec::new(),
        }
    }

    fn handle_publish(&mut self, publish: &PublishPacket) -> Vec<SessionAction> {
        match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => {
                vec![SessionAction::DeliverMessage(publish.to_message())]
            }
            (QoS::AtLeastOnce, Some(packet_id)) => vec![
                SessionAction::DeliverMessage(publish.to_message()),
                SessionAction::SendPacket(Packet::PubAck(
                    PubAckPacket::new(packet_id).with_version(self.protocol_version),
                )),
            ],
            (QoS::ExactlyOnce, Some(packet_id)) => {
                let pubrec = SessionAction::SendPacket(Packet::PubRec(
                    PubRecPacket::new(packet_id).with_version(self.protocol_version),
                ));
                if self.received_not_released.insert(packet_id) {
                    vec![
                        SessionAction::DeliverMessage(publish.to_message()),
                        pubrec,
                    ]
                } else {
                    // Redelivery of a flow we already accepted; ack
                    // again without delivering twice.
                    debug!(packet_id, "duplicate QoS 2 publish, re-sending PUBREC");
                    vec![pubrec]
                }
            }
            (_, None) => {
                warn!("QoS 1/2 publish without packet id reached the session");
                Vec::new()
            }
        }
    }

    fn handle_puback(&mut self, puback: &PubAckPacket) -> Vec<SessionAction> {
        if self.sent_not_acked.remove(&puback.packet_id).is_some() {
            self.allocator.release(puback.packet_id);
            vec![SessionAction::PublishCompleted {
                packet_id: puback.packet_id,
                reason_code: puback.reason_code,
            }]
        } else {
            warn!(packet_id = puback.packet_id, "PUBACK for unknown flow");
            Vec::new()
        }
    }

    fn handle_pubrec(&mut self, pubrec: &PubRecPacket) -> Vec<SessionAction> {
        if self.sent_not_acked.remove(&pubrec.packet_id).is_none() {
            return vec![SessionAction::FlowError {
                packet_id: pubrec.packet_id,
                reason_code: ReasonCode::PacketIdentifierNotFound,
            }];
        }

        if pubrec.reason_code.is_error() {
            self.allocator.release(pubrec.packet_id);
            return vec![SessionAction::FlowError {
                packet_id: pubrec.packet_id,
                reason_code: pubrec.reason_code,
            }];
        }

        let pubrel = PubRelPacket::new(pubrec.packet_id).with_version(self.protocol_version);
        self.pubrel_not_comped
            .insert(pubrec.packet_id, pubrel.clone());
        vec![SessionAction::SendPacket(Packet::PubRel(pubrel))]
    }

    fn handle_pubrel(&mut self, pubrel: &PubRelPacket) -> Vec<SessionAction> {
        let reason_code = if self.received_not_released.remove(&pubrel.packet_id) {
            ReasonCode::Success
        } else {
            ReasonCode::PacketIdentifierNotFound
        };
        vec![SessionAction::SendPacket(Packet::PubComp(
            PubCompPacket::new_with_reason(pubrel.packet_id, reason_code)
                .with_version(self.protocol_version),
        ))]
    }

    fn handle_pubcomp(&mut self, pubcomp: &PubCompPacket) -> Vec<SessionAction> {
        if self.pubrel_not_comped.remove(&pubcomp.packet_id).is_none() {
            warn!(packet_id = pubcomp.packet_id, "PUBCOMP for unknown flow");
            return Vec::new();
        }
        self.allocator.release(pubcomp.packet_id);

        if pubcomp.reason_code.is_error() {
            vec![SessionAction::FlowError {
                packet_id: pubcomp.packet_id,
                reason_code: pubcomp.reason_code,
            }]
        } else {
            vec![SessionAction::PublishCompleted {
                packet_id: pubcomp.packet_id,
                reason_code: ReasonCode::Success,
            }]
        }
    }

    fn handle_suback(&mut self, suback: &SubAckPacket) -> Vec<SessionAction> {
        let Some(subscribe) = self.unacknowledged_subscribes.remove(&suback.packet_id) else {
            warn!(packet_id = suback.packet_id, "SUBACK for unknown subscribe");
            return Vec::new();
        };
        self.allocator.release(suback.packet_id);

        for (filter, code) in subscribe.filters.iter().zip(&suback.reason_codes) {
            if code.is_success() {
                self.subscriptions
                    .insert(filter.filter.clone(), filter.options);
            }
        }

        vec![SessionAction::SubscribeCompleted {
            packet_id: suback.packet_id,
            reason_codes: suback.reason_codes.clone(),
        }]
    }

    fn handle_unsuback(&mut self, unsuback: &UnsubAckPacket) -> Vec<SessionAction> {
        let Some(unsubscribe) = self.unacknowledged_unsubscribes.remove(&unsuback.packet_id)
        else {
            warn!(
                packet_id = unsuback.packet_id,
                "UNSUBACK for unknown unsubscribe"
            );
            return Vec::new();
        };
        self.allocator.release(unsuback.packet_id);

        // 3.1.1 carries no reason codes; treat every filter as removed.
        for (index, filter) in unsubscribe.filters.iter().enumerate() {
            let removed = unsuback
                .reason_codes
                .get(index)
                .map_or(true, ReasonCode::is_success);
            if removed {
                self.subscriptions.remove(filter);
            }
        }

        vec![SessionAction::UnsubscribeCompleted {
            packet_id: unsuback.packet_id,
            reason_codes: unsuback.reason_codes.clone(),
        }]
    }

    /// Packets to retransmit after a reconnect, in the order they must
    /// be written: pending PUBRELs first, then unacknowledged
    /// publishes with the dup flag raised, both by ascending packet id.
    ///
    /// When the server did not resume our session, in-flight publishes
    /// fall back into the pending queue and one SUBSCRIBE re-creating
    /// the acknowledged filters is emitted instead.
    pub fn resume(&mut self, session_present: bool) -> Vec<Packet> {
        if session_present {
            let mut packets = Vec::new();

            let mut pubrels: Vec<&PubRelPacket> = self.pubrel_not_comped.values().collect();
            pubrels.sort_by_key(|p| p.packet_id);
            packets.extend(
                pubrels
                    .into_iter()
                    .map(|p| Packet::PubRel(p.clone())),
            );

            let mut publishes: Vec<&PublishPacket> = self.sent_not_acked.values().collect();
            publishes.sort_by_key(|p| p.packet_id);
            packets.extend(
                publishes
                    .into_iter()
                    .map(|p| Packet::Publish(p.as_duplicate())),
            );

            debug!(count = packets.len(), "resuming session, retransmitting");
            return packets;
        }

        // Fresh session on the server side: nothing in flight survives.
        let mut lost: Vec<PublishPacket> = self.sent_not_acked.drain().map(|(_, p)| p).collect();
        lost.sort_by_key(|p| p.packet_id);
        for publish in lost {
            if let Some(packet_id) = publish.packet_id {
                self.allocator.release(packet_id);
            }
            let mut message = publish.to_message();
            message.dup = false;
            self.pending.enqueue(message);
        }
        for (packet_id, _) in self.pubrel_not_comped.drain() {
            self.allocator.release(packet_id);
        }
        self.received_not_released.clear();

        if self.subscriptions.is_empty() {
            return Vec::new();
        }

        let Ok(packet_id) = self.allocator.allocate() else {
            return Vec::new();
        };
        let mut subscribe = SubscribePacket::new(packet_id).with_version(self.protocol_version);
        let mut filters: Vec<(&String, &SubscriptionOptions)> =
            self.subscriptions.iter().collect();
        filters.sort_by_key(|(filter, _)| filter.as_str());
        for (filter, options) in filters {
            subscribe =
                subscribe.add_filter_with_options(TopicFilter::with_options(filter, *options));
        }
        self.unacknowledged_subscribes
            .insert(packet_id, subscribe.clone());

        vec![Packet::Subscribe(subscribe)]
    }

    /// Drops every piece of session state, for clean-start connects
    /// and final shutdown.
    pub fn reset(&mut self) {
        let ids: Vec<u16> = self
            .sent_not_acked
            .keys()
            .chain(self.pubrel_not_comped.keys())
            .chain(self.unacknowledged_subscribes.keys())
            .chain(self.unacknowledged_unsubscribes.keys())
            .copied()
            .collect();
        for id in ids {
            self.allocator.release(id);
        }
        self.sent_not_acked.clear();
        self.pubrel_not_comped.clear();
        self.received_not_released.clear();
        self.unacknowledged_subscribes.clear();
        self.unacknowledged_unsubscribes.clear();
        self.subscriptions.clear();
        self.pending.clear();
    }

    pub fn pending_mut(&mut self) -> &mut PendingQueue {
        &mut self.pending
    }

    #[must_use]
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    #[must_use]
    pub fn subscriptions(&self) -> &HashMap<String, SubscriptionOptions> {
        &self.subscriptions
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            in_flight_outbound: self.sent_not_acked.len(),
            awaiting_pubcomp: self.pubrel_not_comped.len(),
            awaiting_release_inbound: self.received_not_released.len(),
            unacked_subscribes: self.unacknowledged_subscribes.len(),
            unacked_unsubscribes: self.unacknowledged_unsubscribes.len(),
            pending_messages: self.pending.len(),
            active_subscriptions: self.subscriptions.len(),
        }
    }
}
