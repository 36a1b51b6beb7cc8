//! End-to-end scenarios driven entirely over the in-memory transport:
//! a full cluster of role instances, each on its own thread, exercised
//! through the public `Client`/`Proposer`/`Acceptor`/`Learner` API.

use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use paxos_broadcast::acceptor::Acceptor;
use paxos_broadcast::client::Client;
use paxos_broadcast::config::ClusterConfig;
use paxos_broadcast::learner::{DeliverySink, Learner};
use paxos_broadcast::proposer::Proposer;
use paxos_broadcast::transport::MemoryNetwork;

fn config(num_acceptors: usize) -> ClusterConfig {
    ClusterConfig {
        clients: SocketAddrV4::new(Ipv4Addr::new(239, 2, 1, 1), 8000),
        proposers: SocketAddrV4::new(Ipv4Addr::new(239, 2, 1, 2), 8001),
        acceptors: SocketAddrV4::new(Ipv4Addr::new(239, 2, 1, 3), 8002),
        learners: SocketAddrV4::new(Ipv4Addr::new(239, 2, 1, 4), 8003),
        num_acceptors,
    }
}

fn recording_sink() -> (DeliverySink, Arc<Mutex<Vec<String>>>) {
    let out = Arc::new(Mutex::new(Vec::new()));
    let out2 = out.clone();
    let sink: DeliverySink = Box::new(move |line: &str| out2.lock().unwrap().push(line.to_string()));
    (sink, out)
}

fn spawn_acceptors(net: &MemoryNetwork, cfg: &ClusterConfig, count: usize, start_id: u64) {
    for i in 0..count {
        let transport = net.join(cfg.acceptors);
        let cfg = cfg.clone();
        let id = start_id + i as u64;
        thread::spawn(move || {
            let mut acceptor = Acceptor::new(id, transport, &cfg);
            acceptor.run();
        });
    }
}

fn spawn_proposer(net: &MemoryNetwork, cfg: &ClusterConfig, id: u64, batch_size: usize) {
    let transport = net.join(cfg.proposers);
    let cfg = cfg.clone();
    thread::spawn(move || {
        let mut proposer = Proposer::new(id, transport, &cfg, batch_size);
        proposer.run();
    });
}

fn spawn_learner(net: &MemoryNetwork, cfg: &ClusterConfig, id: u64) -> Arc<Mutex<Vec<String>>> {
    let transport = net.join(cfg.learners);
    let cfg = cfg.clone();
    let (sink, out) = recording_sink();
    thread::spawn(move || {
        let mut learner = Learner::new(id, transport, &cfg, sink);
        learner.run();
    });
    out
}

fn submit_lines(net: &MemoryNetwork, cfg: &ClusterConfig, client_id: u64, lines: &str) {
    let transport = net.join(cfg.clients);
    let mut client = Client::new(client_id, transport, cfg);
    client.run(Cursor::new(lines.to_string()));
}

fn wait_for(out: &Arc<Mutex<Vec<String>>>, count: usize, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if out.lock().unwrap().len() >= count || std::time::Instant::now() >= deadline {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn delivers_values_in_order_with_a_healthy_cluster() {
    let cfg = config(3);
    let net = MemoryNetwork::new();

    spawn_acceptors(&net, &cfg, 3, 100);
    spawn_proposer(&net, &cfg, 1, 1);
    let out = spawn_learner(&net, &cfg, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "alpha\nbeta\ngamma\n");

    wait_for(&out, 3, Duration::from_secs(2));
    assert_eq!(
        *out.lock().unwrap(),
        vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    );
}

#[test]
fn a_late_joining_learner_catches_up_via_query_last_and_catch_up() {
    let cfg = config(3);
    let net = MemoryNetwork::new();

    spawn_acceptors(&net, &cfg, 3, 200);
    spawn_proposer(&net, &cfg, 1, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "first\nsecond\n");

    // Give the cluster time to choose both instances before any
    // learner exists to observe them directly.
    thread::sleep(Duration::from_millis(200));

    let out = spawn_learner(&net, &cfg, 1);
    wait_for(&out, 2, Duration::from_secs(2));
    assert_eq!(*out.lock().unwrap(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn a_minority_of_acceptors_crashing_does_not_block_progress() {
    let cfg = config(3);
    let net = MemoryNetwork::new();

    // Only 2 of the 3 configured acceptors ever come up; majority is
    // still reachable (floor(3/2)+1 == 2).
    spawn_acceptors(&net, &cfg, 2, 300);
    spawn_proposer(&net, &cfg, 1, 1);
    let out = spawn_learner(&net, &cfg, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "still\nworks\n");

    wait_for(&out, 2, Duration::from_secs(2));
    assert_eq!(*out.lock().unwrap(), vec!["still".to_string(), "works".to_string()]);
}

#[test]
fn a_proposer_batches_several_submissions_into_one_instance() {
    let cfg = config(3);
    let net = MemoryNetwork::new();

    spawn_acceptors(&net, &cfg, 3, 400);
    spawn_proposer(&net, &cfg, 1, 4);
    let out = spawn_learner(&net, &cfg, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "w\nx\ny\nz\n");

    wait_for(&out, 4, Duration::from_secs(2));
    assert_eq!(
        *out.lock().unwrap(),
        vec!["w".to_string(), "x".to_string(), "y".to_string(), "z".to_string()]
    );
}

#[test]
fn two_competing_proposers_still_converge_on_one_total_order() {
    let cfg = config(3);
    let net = MemoryNetwork::new();

    spawn_acceptors(&net, &cfg, 3, 500);
    spawn_proposer(&net, &cfg, 1, 1);
    spawn_proposer(&net, &cfg, 2, 1);
    let out = spawn_learner(&net, &cfg, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "m\n");
    submit_lines(&net, &cfg, 2, "n\n");

    wait_for(&out, 2, Duration::from_secs(2));
    let delivered = out.lock().unwrap().clone();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.contains(&"m".to_string()));
    assert!(delivered.contains(&"n".to_string()));
}

#[test]
fn delivery_survives_a_lossy_network() {
    let cfg = config(3);
    let net = MemoryNetwork::with_drop_probability(0.2, 42);

    spawn_acceptors(&net, &cfg, 3, 600);
    spawn_proposer(&net, &cfg, 1, 1);
    let out = spawn_learner(&net, &cfg, 1);

    thread::sleep(Duration::from_millis(50));
    submit_lines(&net, &cfg, 1, "p\nq\nr\n");

    wait_for(&out, 3, Duration::from_secs(5));
    assert_eq!(
        *out.lock().unwrap(),
        vec!["p".to_string(), "q".to_string(), "r".to_string()]
    );
}
