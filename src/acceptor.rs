//! The acceptor role. An acceptor is purely
//! reactive: every operation is triggered by an incoming datagram, it
//! never retries, and its only policy is silent drop or round
//! monotonicity. Its state shape holds a single promised round shared
//! across all instances, rather than one independent `rnd` per
//! instance.

use std::collections::HashMap;
use std::net::SocketAddrV4;

use log::{debug, info};

use crate::config::ClusterConfig;
use crate::message::{Batch, Instance, Message, NodeId, Round};
use crate::transport::Transport;

/// The last-accepted `(round, value)` pair for one instance.
type Accepted = (Round, Batch);

pub struct Acceptor<T: Transport> {
    id: NodeId,
    transport: T,
    proposers_addr: SocketAddrV4,
    learners_addr: SocketAddrV4,

    /// Highest round this acceptor has promised. Shared across every
    /// instance: one leader-like proposer dominates in steady state.
    rnd: Round,

    /// Last accepted `(v_rnd, v_val)` per instance. Persists in memory
    /// for the process lifetime; invariant v_rnd <= rnd always holds.
    accepted: HashMap<Instance, Accepted>,
}

impl<T: Transport> Acceptor<T> {
    pub fn new(id: NodeId, transport: T, config: &ClusterConfig) -> Self {
        Acceptor {
            id,
            transport,
            proposers_addr: config.proposers,
            learners_addr: config.learners,
            rnd: 0,
            accepted: HashMap::new(),
        }
    }

    fn max_instance(&self) -> Instance {
        self.accepted.keys().copied().max().unwrap_or(-1)
    }

    /// On PREPARE(c_rnd, pid): promise if c_rnd > rnd, else drop.
    fn handle_prepare(&mut self, c_rnd: Round, proposer_id: NodeId) {
        if c_rnd <= self.rnd {
            debug!(
                "[A={}] dropping PREPARE(c_rnd={}) <= rnd={}",
                self.id, c_rnd, self.rnd
            );
            return;
        }

        self.rnd = c_rnd;
        let reply = Message::Promise {
            rnd: self.rnd,
            max_instance: self.max_instance(),
            proposer_id,
        };
        debug!("[A={}] sending {:?}", self.id, reply);
        self.transport.send(self.proposers_addr, &reply);
    }

    /// On ACCEPT(c_rnd, val, pid, instance): accept if c_rnd >= rnd,
    /// broadcasting ACCEPTED to both learners (canonical chosen-
    /// detection feed) and proposers (so the proposer's own quorum
    /// accumulator can fire without the learner in the loop).
    fn handle_accept(&mut self, c_rnd: Round, value: Batch, proposer_id: NodeId, instance: Instance) {
        if c_rnd < self.rnd {
            debug!(
                "[A={}] dropping ACCEPT(c_rnd={}) < rnd={}",
                self.id, c_rnd, self.rnd
            );
            return;
        }

        self.accepted.insert(instance, (c_rnd, value.clone()));

        self.transport.send(
            self.learners_addr,
            &Message::AcceptedLearner {
                v_rnd: c_rnd,
                v_val: value.clone(),
                instance,
            },
        );
        self.transport.send(
            self.proposers_addr,
            &Message::AcceptedProposer {
                v_rnd: c_rnd,
                v_val: value,
                proposer_id,
            },
        );
    }

    /// On CATCHUP(i): reply with the stored value if we have one,
    /// otherwise drop silently (the learner will retry or stall).
    fn handle_catch_up(&mut self, instance: Instance) {
        if let Some((_, value)) = self.accepted.get(&instance) {
            self.transport.send(
                self.learners_addr,
                &Message::CatchUpResp {
                    instance,
                    value: value.clone(),
                },
            );
        }
    }

    /// On QUERY_LAST: reply with the highest known instance, or -1.
    fn handle_query_last(&mut self) {
        self.transport.send(
            self.learners_addr,
            &Message::LastResp {
                max_instance: self.max_instance(),
            },
        );
    }

    /// Runs this acceptor's single-threaded event loop forever.
    pub fn run(&mut self) -> ! {
        info!("[A={}] acceptor listening", self.id);
        loop {
            let (msg, _src) = self.transport.recv();
            match msg {
                Message::Prepare { c_rnd, proposer_id } => self.handle_prepare(c_rnd, proposer_id),
                Message::Accept {
                    c_rnd,
                    value,
                    proposer_id,
                    instance,
                } => self.handle_accept(c_rnd, value, proposer_id, instance),
                Message::CatchUp { instance } => self.handle_catch_up(instance),
                Message::QueryLast => self.handle_query_last(),
                other => debug!("[A={}] ignoring unexpected message {:?}", self.id, other),
            }
        }
    }
}
