//! The client driver. Reads newline-delimited
//! values from stdin, submits each as a `CLIENT(value, msg_num,
//! client_id)` datagram to the proposers group, and — in optional
//! latency-measurement mode — times how long it takes for the next
//! datagram to arrive on the learners group and appends the
//! microsecond sample to a per-client log file.
//!
//! Reads from stdin in a loop, tagging each submission with a
//! per-client monotonic `msg_num` instead of a UUID.

use std::io::{BufRead, Write};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};

use crate::config::ClusterConfig;
use crate::message::{ClientRequest, Message, NodeId};
use crate::transport::Transport;

pub struct Client<T: Transport> {
    id: NodeId,
    transport: T,
    proposers_addr: SocketAddrV4,
    msg_num: u64,
    /// When set, the client joins the learners group and times the
    /// first inbound datagram after each submission.
    latency_log: Option<PathBuf>,
}

impl<T: Transport> Client<T> {
    pub fn new(id: NodeId, transport: T, config: &ClusterConfig) -> Self {
        Client {
            id,
            transport,
            proposers_addr: config.proposers,
            msg_num: 0,
            latency_log: None,
        }
    }

    /// Enables latency measurement, appending samples (microseconds,
    /// decimal) to `logs/latency_client<id>`.
    pub fn with_latency_measurement(mut self, logs_dir: &Path) -> Self {
        self.latency_log = Some(logs_dir.join(format!("latency_client{}", self.id)));
        self
    }

    fn submit(&mut self, value: String) {
        let request = ClientRequest {
            client_id: self.id,
            msg_num: self.msg_num,
            value,
        };
        self.msg_num += 1;

        let start = self.latency_log.is_some().then(Instant::now);

        debug!("[C={}] sending {:?}", self.id, request);
        self.transport.send(self.proposers_addr, &Message::Client(request));

        if let (Some(start), Some(path)) = (start, self.latency_log.clone()) {
            // Purely local measurement: the first datagram observed on
            // the learners group after sending, whatever it is.
            let (_, _src) = self.transport.recv();
            let elapsed_micros = start.elapsed().as_micros();
            if let Err(e) = append_latency_sample(&path, elapsed_micros) {
                log::warn!("[C={}] could not write latency sample: {}", self.id, e);
            }
        }
    }

    /// Reads newline-delimited values from `input` until EOF,
    /// submitting each in turn.
    pub fn run<R: BufRead>(&mut self, input: R) {
        info!("[C={}] client reading stdin", self.id);
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            self.submit(line);
        }
        debug!("[C={}] client done", self.id);
    }
}

fn append_latency_sample(path: &Path, micros: u128) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", micros)
}
