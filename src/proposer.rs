//! The proposer role: converts a stream of client submissions into a
//! totally ordered sequence of chosen batches by driving Paxos phase
//! 1/2 and allocating instance slots. A single-attempt-at-a-time state
//! machine (IDLE/PREPARING/ACCEPTING/PROACTIVE/CHOSEN), rather than one
//! state machine per instance running concurrently: a proposer never
//! begins a new ACCEPT before the previous attempt has been decided.

use std::collections::{HashSet, VecDeque};
use std::net::{SocketAddr, SocketAddrV4};

use log::{debug, info};

use crate::config::ClusterConfig;
use crate::message::{Batch, ClientRequest, Instance, Message, NodeId, Round};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No attempt has ever started yet (only true before the very
    /// first submission arrives).
    Idle,
    /// Sent a PREPARE, waiting for a 1B quorum.
    Preparing,
    /// Have a 1B quorum and an instance, but no value to propose yet.
    Proactive,
    /// Sent an ACCEPT, waiting for a 2B quorum.
    Accepting,
}

pub struct Proposer<T: Transport> {
    id: NodeId,
    transport: T,
    acceptors_addr: SocketAddrV4,
    learners_addr: SocketAddrV4,
    majority: usize,
    batch_size: usize,

    /// FIFO queue of submissions not yet attached to any attempt.
    queue: VecDeque<ClientRequest>,

    /// Next instance slot this proposer intends to use. Advances past
    /// instances already claimed elsewhere.
    consensus_instance: Instance,

    phase: Phase,
    c_rnd: Round,

    /// Instance the current attempt (PREPARING/PROACTIVE/ACCEPTING) is for.
    current_instance: Option<Instance>,

    /// Distinct acceptor addresses that have promised this attempt's round.
    promises: HashSet<SocketAddr>,
    max_instance_seen: Instance,

    /// Distinct acceptor addresses that have accepted this attempt.
    accepts: HashSet<SocketAddr>,
}

impl<T: Transport> Proposer<T> {
    pub fn new(id: NodeId, transport: T, config: &ClusterConfig, batch_size: usize) -> Self {
        Proposer {
            id,
            transport,
            acceptors_addr: config.acceptors,
            learners_addr: config.learners,
            majority: config.majority(),
            batch_size: batch_size.max(1),
            queue: VecDeque::new(),
            consensus_instance: 0,
            phase: Phase::Idle,
            c_rnd: 0,
            current_instance: None,
            promises: HashSet::new(),
            max_instance_seen: -1,
            accepts: HashSet::new(),
        }
    }

    /// Sends a new PREPARE, always incrementing c_rnd: never reset or
    /// reuse c_rnd, even for a proactive re-prepare after CHOSEN.
    fn send_prepare(&mut self) {
        self.c_rnd += 1;
        self.phase = Phase::Preparing;
        self.promises.clear();
        self.max_instance_seen = -1;

        let msg = Message::Prepare {
            c_rnd: self.c_rnd,
            proposer_id: self.id,
        };
        debug!("[P={}] sending {:?}", self.id, msg);
        self.transport.send(self.acceptors_addr, &msg);
    }

    fn next_batch(&mut self) -> Batch {
        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            match self.queue.pop_front() {
                Some(req) => batch.push(req),
                None => break,
            }
        }
        batch
    }

    /// Handles a freshly submitted client request.
    fn handle_client_request(&mut self, request: ClientRequest) {
        self.queue.push_back(request);

        match self.phase {
            Phase::Idle => self.send_prepare(),
            Phase::Proactive => self.enter_accepting(),
            Phase::Preparing | Phase::Accepting => {
                // Already mid-attempt: the new request waits in queue.
            }
        }
    }

    /// Forms a batch from the queue and sends ACCEPT, reusing whatever
    /// quorum/instance the current attempt already holds.
    fn enter_accepting(&mut self) {
        let instance = self
            .current_instance
            .expect("enter_accepting requires an allocated instance");
        let batch = self.next_batch();

        self.phase = Phase::Accepting;
        self.accepts.clear();

        let msg = Message::Accept {
            c_rnd: self.c_rnd,
            value: batch,
            proposer_id: self.id,
            instance,
        };
        debug!("[P={}] sending {:?}", self.id, msg);
        self.transport.send(self.acceptors_addr, &msg);
    }

    /// On PROMISE(rnd, max_instance, pid): only meaningful for this
    /// proposer's own in-flight PREPARE (filtered by rnd == c_rnd,
    /// which also implicitly filters to the current attempt, since
    /// c_rnd increases by one on every PREPARE this proposer issues).
    fn handle_promise(
        &mut self,
        rnd: Round,
        max_instance: Instance,
        proposer_id: NodeId,
        src: SocketAddr,
    ) {
        if proposer_id != self.id || self.phase != Phase::Preparing || rnd != self.c_rnd {
            return;
        }

        if max_instance > self.max_instance_seen {
            self.max_instance_seen = max_instance;
        }

        if !self.promises.insert(src) {
            return; // duplicate reply from an acceptor we already counted
        }

        if self.promises.len() < self.majority {
            return;
        }

        debug!("[P={}] 1B quorum reached for c_rnd={}", self.id, self.c_rnd);

        let allocated = (self.consensus_instance).max(self.max_instance_seen + 1);
        self.consensus_instance = allocated;
        self.current_instance = Some(allocated);

        if self.queue.is_empty() {
            self.phase = Phase::Proactive;
        } else {
            self.enter_accepting();
        }
    }

    /// On ACCEPTED(v_rnd, v_val, pid) from an acceptor: count toward
    /// the current attempt's 2B quorum if it matches our round and is
    /// addressed to us (v_rnd == c_rnd && proposer_id == self).
    fn handle_accepted(&mut self, v_rnd: Round, proposer_id: NodeId, src: SocketAddr) {
        if proposer_id != self.id || self.phase != Phase::Accepting || v_rnd != self.c_rnd {
            return;
        }

        if !self.accepts.insert(src) {
            return;
        }

        if self.accepts.len() < self.majority {
            return;
        }

        info!(
            "[P={}] instance {:?} chosen at round {}",
            self.id, self.current_instance, self.c_rnd
        );

        // Proactive prepare: unconditionally start the next attempt,
        // even if the queue is empty.
        self.send_prepare();
    }

    /// Runs this proposer's single-threaded event loop forever.
    pub fn run(&mut self) -> ! {
        info!("[P={}] proposer listening", self.id);
        loop {
            let (msg, src) = self.transport.recv();
            match msg {
                Message::Client(request) => self.handle_client_request(request),
                Message::Promise {
                    rnd,
                    max_instance,
                    proposer_id,
                } => self.handle_promise(rnd, max_instance, proposer_id, src),
                Message::AcceptedProposer {
                    v_rnd,
                    v_val: _,
                    proposer_id,
                } => self.handle_accepted(v_rnd, proposer_id, src),
                other => debug!("[P={}] ignoring unexpected message {:?}", self.id, other),
            }
        }
    }
}
