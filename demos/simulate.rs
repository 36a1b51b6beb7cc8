//! Simulates a full cluster locally (one process, in-memory transport
//! instead of real multicast sockets).
//!
//!     RUST_LOG=paxos_broadcast=info cargo run --example simulate

use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use log::info;

use paxos_broadcast::acceptor::Acceptor;
use paxos_broadcast::client::Client;
use paxos_broadcast::config::ClusterConfig;
use paxos_broadcast::learner::{stdout_sink, Learner};
use paxos_broadcast::proposer::Proposer;
use paxos_broadcast::transport::MemoryNetwork;

const NUM_ACCEPTORS: usize = 3;

fn demo_config() -> ClusterConfig {
    ClusterConfig {
        clients: SocketAddrV4::new(Ipv4Addr::new(239, 1, 1, 1), 7000),
        proposers: SocketAddrV4::new(Ipv4Addr::new(239, 1, 1, 2), 7001),
        acceptors: SocketAddrV4::new(Ipv4Addr::new(239, 1, 1, 3), 7002),
        learners: SocketAddrV4::new(Ipv4Addr::new(239, 1, 1, 4), 7003),
        num_acceptors: NUM_ACCEPTORS,
    }
}

fn main() {
    env_logger::init();

    let config = demo_config();
    info!("configuration = {:?}", config.acceptors);

    let net = MemoryNetwork::new();
    let mut uid: u64 = 0;
    let mut threads = Vec::new();

    // One extra participant for the client thread, so everything lines
    // up behind the same barrier before the first submission.
    let barrier = Arc::new(Barrier::new(NUM_ACCEPTORS + 1 + 1 + 1));

    for _ in 0..NUM_ACCEPTORS {
        let transport = net.join(config.acceptors);
        let cfg = config.clone();
        let b = barrier.clone();
        let id = uid;
        uid += 1;
        threads.push(thread::spawn(move || {
            let mut acceptor = Acceptor::new(id, transport, &cfg);
            b.wait();
            acceptor.run();
        }));
    }

    {
        let transport = net.join(config.proposers);
        let cfg = config.clone();
        let b = barrier.clone();
        let id = uid;
        uid += 1;
        threads.push(thread::spawn(move || {
            let mut proposer = Proposer::new(id, transport, &cfg, 2);
            b.wait();
            proposer.run();
        }));
    }

    {
        let transport = net.join(config.learners);
        let cfg = config.clone();
        let b = barrier.clone();
        let id = uid;
        uid += 1;
        threads.push(thread::spawn(move || {
            let mut learner = Learner::new(id, transport, &cfg, stdout_sink());
            b.wait();
            learner.run();
        }));
    }

    let client_transport = net.join(config.clients);
    let client_cfg = config.clone();
    let client_id = uid;
    let b = barrier.clone();
    let client_thread = thread::spawn(move || {
        let mut client = Client::new(client_id, client_transport, &client_cfg);
        b.wait();
        client.run(Cursor::new("one\ntwo\nthree\n"));
    });

    client_thread.join().expect("client thread panicked");

    // Acceptors, proposer and learner loop forever: give them a window
    // to finish consensus and print, then exit without joining them.
    thread::sleep(Duration::from_millis(500));
    info!("simulation window elapsed, exiting");
}
