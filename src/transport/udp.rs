//! Real UDP multicast transport: one socket to send from (bound to an
//! ephemeral port), one socket to receive on (bound to the multicast
//! group itself, `SO_REUSEADDR` so every process of a role can share
//! the port, `join_multicast_v4` to actually receive the group's
//! traffic).

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use bincode::{deserialize, serialize};
use log::warn;
use net2::UdpBuilder;

use crate::error::{PaxosError, Result};
use crate::message::Message;
use crate::transport::{Transport, MAX_DATAGRAM_BYTES};

pub struct UdpMulticastTransport {
    sender: UdpSocket,
    receiver: UdpSocket,
}

impl UdpMulticastTransport {
    /// Binds a sender (any free port) and a receiver joined to the
    /// multicast group `own_group` — the address this role listens on.
    pub fn new(own_group: SocketAddrV4) -> Result<Self> {
        let sender = UdpSocket::bind("0.0.0.0:0").map_err(|source| PaxosError::SocketBind {
            addr: own_group,
            source,
        })?;
        sender
            .set_multicast_loop_v4(true)
            .map_err(|source| PaxosError::SocketBind {
                addr: own_group,
                source,
            })?;

        let receiver = UdpBuilder::new_v4()
            .map_err(|source| PaxosError::SocketBind {
                addr: own_group,
                source,
            })?
            .reuse_address(true)
            .map_err(|source| PaxosError::SocketBind {
                addr: own_group,
                source,
            })?
            .bind(own_group)
            .map_err(|source| PaxosError::SocketBind {
                addr: own_group,
                source,
            })?;

        receiver
            .join_multicast_v4(own_group.ip(), &Ipv4Addr::UNSPECIFIED)
            .map_err(|source| PaxosError::MulticastJoin {
                addr: own_group,
                source,
            })?;

        Ok(UdpMulticastTransport { sender, receiver })
    }

    fn decode(buf: &[u8]) -> Option<Message> {
        match deserialize(buf) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!("dropping unparseable datagram ({} bytes): {}", buf.len(), e);
                None
            }
        }
    }
}

impl Transport for UdpMulticastTransport {
    fn send(&self, group: SocketAddrV4, msg: &Message) {
        let encoded: Vec<u8> = serialize(msg).expect("message types are always serializable");
        self.sender
            .send_to(&encoded[..], group)
            .expect("could not send datagram");
    }

    fn recv(&self) -> (Message, SocketAddr) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            match self.receiver.recv_from(&mut buf) {
                Ok((n, src)) => {
                    if let Some(msg) = Self::decode(&buf[..n]) {
                        return (msg, src);
                    }
                    // malformed datagram: keep listening
                }
                Err(e) => {
                    warn!("recv error, retrying: {}", e);
                }
            }
        }
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<(Message, SocketAddr)> {
        self.receiver
            .set_read_timeout(Some(timeout))
            .expect("could not set read timeout");

        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            match self.receiver.recv_from(&mut buf) {
                Ok((n, src)) => {
                    if let Some(msg) = Self::decode(&buf[..n]) {
                        return Some((msg, src));
                    }
                    // malformed datagram: keep waiting out the same timeout window
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return None;
                }
                Err(e) => {
                    warn!("recv error, retrying within the same timeout window: {}", e);
                }
            }
        }
    }
}
