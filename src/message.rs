//! The tagged-union wire protocol for the four roles. Field order and
//! types are stable across roles: every role encodes and decodes the
//! same `Message` enum with `bincode`, shared by client, proposer,
//! acceptor and learner.
//!
//! Wire integers are fixed-width (`u64`/`i64`) rather than `usize`, so
//! the encoding doesn't depend on the pointer width of the machine
//! that happens to be running a given role.

use serde::{Deserialize, Serialize};

/// A proposer's round number. Strictly increasing per proposer; the
/// proposer_id carried alongside each round in message envelopes is
/// what lets an acceptor-wide comparison stay safe without a
/// lexicographic (round, proposer_id) tuple type.
pub type Round = u64;

/// Index of a slot in the replicated log. `-1` is the sentinel for "no
/// instance accepted yet", matching an acceptor with an empty
/// `accepted` map.
pub type Instance = i64;

/// Identifies a proposer, acceptor, learner or client process. Carried
/// in envelopes so a role can filter messages addressed to itself out
/// of a broadcast group.
pub type NodeId = u64;

/// One client submission, identified for dedup/FIFO purposes by
/// `(client_id, msg_num)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientRequest {
    pub client_id: NodeId,
    pub msg_num: u64,
    pub value: String,
}

/// An ordered batch of client requests, treated as one opaque Paxos
/// value. Always a batch, even when it holds a single request.
pub type Batch = Vec<ClientRequest>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Message {
    /// client -> proposer
    Client(ClientRequest),

    /// proposer -> acceptor (Phase 1A)
    Prepare { c_rnd: Round, proposer_id: NodeId },

    /// acceptor -> proposer (Phase 1B). No acceptor id: the proposer's
    /// quorum accumulator keys distinctness by UDP source address.
    Promise {
        rnd: Round,
        max_instance: Instance,
        proposer_id: NodeId,
    },

    /// proposer -> acceptor (Phase 2A)
    Accept {
        c_rnd: Round,
        value: Batch,
        proposer_id: NodeId,
        instance: Instance,
    },

    /// acceptor -> learner (Phase 2B), the canonical chosen-detection feed.
    AcceptedLearner {
        v_rnd: Round,
        v_val: Batch,
        instance: Instance,
    },

    /// acceptor -> proposer (Phase 2B), lets the proposer's own quorum
    /// accumulator fire without depending on the learner.
    AcceptedProposer {
        v_rnd: Round,
        v_val: Batch,
        proposer_id: NodeId,
    },

    /// learner -> acceptor: ask for a missing instance.
    CatchUp { instance: Instance },

    /// acceptor -> learner: answer to CatchUp.
    CatchUpResp { instance: Instance, value: Batch },

    /// learner -> acceptor: ask how far the cluster has progressed.
    QueryLast,

    /// acceptor -> learner: answer to QueryLast.
    LastResp { max_instance: Instance },
}
