//! In-process multicast simulator used by tests and `demos/simulate.rs`
//! so the protocol logic can be exercised deterministically without
//! real sockets. Same shape as the real transport (one transport per
//! role instance, bind to receive on "your" group, send to any group),
//! but backed by channels instead of UDP, with an optional drop
//! probability to stand in for lossy-network scenarios.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::message::Message;
use crate::transport::Transport;

type Mailbox = Sender<(Message, SocketAddr)>;

/// Shared hub: which mailboxes are subscribed to which multicast
/// group. Cloning a `MemoryNetwork` shares the same underlying hub, the
/// way every real process shares the same physical multicast groups.
#[derive(Clone)]
pub struct MemoryNetwork {
    subscribers: Arc<Mutex<HashMap<SocketAddrV4, Vec<Mailbox>>>>,
    /// Probability, in [0.0, 1.0], that any given send to any given
    /// subscriber is independently dropped — simulates per-receiver
    /// datagram loss over an unreliable multicast transport.
    drop_probability: f64,
    rng: Arc<Mutex<StdRng>>,
}

static NEXT_SOURCE_PORT: AtomicU16 = AtomicU16::new(1);

impl Default for MemoryNetwork {
    fn default() -> Self {
        MemoryNetwork::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        MemoryNetwork {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            drop_probability: 0.0,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(0))),
        }
    }

    /// A network that drops each send to each subscriber independently
    /// with `probability` chance, for exercising loss-tolerant
    /// catch-up behavior. Seeded for reproducible test runs.
    pub fn with_drop_probability(probability: f64, seed: u64) -> Self {
        MemoryNetwork {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            drop_probability: probability,
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Creates a new transport bound to receive on `own_group`. Each
    /// transport gets a distinct synthetic source address, standing in
    /// for the distinct UDP source port a real OS would assign —
    /// proposer quorum counting relies on this distinctness.
    pub fn join(&self, own_group: SocketAddrV4) -> MemoryTransport {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap()
            .entry(own_group)
            .or_default()
            .push(tx);

        let port = NEXT_SOURCE_PORT.fetch_add(1, Ordering::SeqCst);
        let source_addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], port));

        MemoryTransport {
            network: self.clone(),
            inbox: rx,
            source_addr,
        }
    }
}

pub struct MemoryTransport {
    network: MemoryNetwork,
    inbox: Receiver<(Message, SocketAddr)>,
    source_addr: SocketAddr,
}

impl Transport for MemoryTransport {
    fn send(&self, group: SocketAddrV4, msg: &Message) {
        let subscribers = self.network.subscribers.lock().unwrap();
        if let Some(mailboxes) = subscribers.get(&group) {
            for mailbox in mailboxes {
                if self.network.drop_probability > 0.0 {
                    let dropped = self
                        .network
                        .rng
                        .lock()
                        .unwrap()
                        .gen_bool(self.network.drop_probability);
                    if dropped {
                        continue;
                    }
                }
                // A send can fail if the receiving end was dropped
                // (process "crashed"); that's just another form of
                // message loss from the sender's point of view.
                let _ = mailbox.send((msg.clone(), self.source_addr));
            }
        }
    }

    fn recv(&self) -> (Message, SocketAddr) {
        self.inbox.recv().expect("sender half dropped")
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<(Message, SocketAddr)> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::net::Ipv4Addr;

    fn group(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(239, 0, 0, 1), port)
    }

    #[test]
    fn delivers_to_every_subscriber_of_a_group() {
        let net = MemoryNetwork::new();
        let g = group(9000);
        let a = net.join(g);
        let b = net.join(g);

        a.send(g, &Message::QueryLast);

        let (msg_a, _) = a.recv_timeout(Duration::from_millis(50)).unwrap();
        let (msg_b, _) = b.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(msg_a, Message::QueryLast);
        assert_eq!(msg_b, Message::QueryLast);
    }

    #[test]
    fn distinct_transports_have_distinct_source_addresses() {
        let net = MemoryNetwork::new();
        let g = group(9001);
        let a = net.join(g);
        let b = net.join(g);

        b.send(g, &Message::QueryLast);
        let (_, src) = a.recv_timeout(Duration::from_millis(50)).unwrap();

        a.send(g, &Message::QueryLast);
        let (_, src2) = b.recv_timeout(Duration::from_millis(50)).unwrap();

        assert_ne!(src, src2);
    }

    #[test]
    fn recv_timeout_returns_none_when_idle() {
        let net = MemoryNetwork::new();
        let a = net.join(group(9002));
        assert!(a.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn a_seeded_lossy_network_reproduces_the_same_drops() {
        let g = group(9003);
        let run = |seed: u64| {
            let net = MemoryNetwork::with_drop_probability(0.5, seed);
            let a = net.join(g);
            let b = net.join(g);
            for _ in 0..20 {
                a.send(g, &Message::QueryLast);
            }
            let mut received = 0;
            while b.recv_timeout(Duration::from_millis(5)).is_some() {
                received += 1;
            }
            received
        };

        assert_eq!(run(7), run(7));
    }

    #[test]
    fn a_lossy_network_drops_each_subscriber_independently() {
        let net = MemoryNetwork::with_drop_probability(0.5, 1);
        let g = group(9004);
        let a = net.join(g);
        let b = net.join(g);
        let c = net.join(g);

        for _ in 0..50 {
            a.send(g, &Message::QueryLast);
        }

        let count = |t: &MemoryTransport| {
            let mut n = 0;
            while t.recv_timeout(Duration::from_millis(5)).is_some() {
                n += 1;
            }
            n
        };
        let received_b = count(&b);
        let received_c = count(&c);

        // With an independent coin flip per subscriber, two receivers
        // of the same 50 sends are extremely unlikely to see exactly
        // the same count purely by chance alignment, and both should
        // see roughly half given a 0.5 drop rate.
        assert!(received_b > 10 && received_b < 40);
        assert!(received_c > 10 && received_c < 40);
    }
}
