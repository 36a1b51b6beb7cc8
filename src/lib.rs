//! A replicated total-order broadcast service built on Multi-Paxos.
//! See DESIGN.md for the full design. Four roles — client,
//! proposer, acceptor, learner — communicate exclusively over UDP
//! multicast, each running a single-threaded event loop with no
//! background threads (the learner's two retry timers are driven by
//! polling `recv_timeout`, not by spawned tasks).

pub mod acceptor;
pub mod client;
pub mod cli;
pub mod config;
pub mod error;
pub mod learner;
pub mod message;
pub mod proposer;
pub mod transport;
