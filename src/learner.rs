//! The learner role — the most involved of the four, because it is the
//! only component that synthesizes reliability out of an unreliable
//! transport: acceptors are passive and proposers don't retransmit
//! past-chosen instances, so gap detection and catch-up live here.
//!
//! Keeps the overall shape of a per-instance map with a
//! print-in-order drain loop, generalized with quorum-counting,
//! per-client FIFO buffering, and two poll-driven retry timers. There
//! is no background thread: both timers are driven by the 100 ms
//! timeout on the learner's own `recv_timeout` poll.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::message::{Batch, Instance, Message, NodeId, Round};
use crate::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CATCHUP_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const QUERY_RETRY_INTERVAL: Duration = Duration::from_millis(500);
const CATCHUP_BATCH_SIZE: usize = 200;
const CATCHUP_BATCH_PAUSE: Duration = Duration::from_millis(5);

/// Where delivered values go. Production code prints to stdout,
/// flushed immediately; tests substitute a closure that records into a
/// buffer so delivery order can be asserted.
pub type DeliverySink = Box<dyn FnMut(&str) + Send>;

pub fn stdout_sink() -> DeliverySink {
    Box::new(|line: &str| {
        println!("{}", line);
        let _ = std::io::stdout().flush();
    })
}

pub struct Learner<T: Transport> {
    id: NodeId,
    transport: T,
    acceptors_addr: SocketAddrV4,
    majority: usize,
    sink: DeliverySink,

    /// Next instance index to deliver, in order.
    global_next_seq: Instance,
    /// Chosen-but-not-yet-deliverable values, keyed by instance.
    instance_buffer: HashMap<Instance, Batch>,
    /// Per-instance (round, value) -> distinct acceptor addresses that
    /// reported accepting it, until a majority agrees.
    quorum_2b: HashMap<Instance, HashMap<(Round, Batch), HashSet<SocketAddr>>>,
    /// Per-(client, msg_num) values waiting for their turn within a
    /// client's FIFO sequence.
    client_buffer: HashMap<(NodeId, u64), String>,
    client_next_seq: HashMap<NodeId, u64>,

    catchup_pending: HashSet<Instance>,
    last_catchup_retry: Instant,
    last_query_retry: Instant,
    last_activity: Instant,
}

impl<T: Transport> Learner<T> {
    pub fn new(id: NodeId, transport: T, config: &ClusterConfig, sink: DeliverySink) -> Self {
        let now = Instant::now();
        Learner {
            id,
            transport,
            acceptors_addr: config.acceptors,
            majority: config.majority(),
            sink,
            global_next_seq: 0,
            instance_buffer: HashMap::new(),
            quorum_2b: HashMap::new(),
            client_buffer: HashMap::new(),
            client_next_seq: HashMap::new(),
            catchup_pending: HashSet::new(),
            last_catchup_retry: now,
            last_query_retry: now,
            last_activity: now,
        }
    }

    fn send_query_last(&mut self) {
        debug!("[L={}] sending QueryLast", self.id);
        self.transport.send(self.acceptors_addr, &Message::QueryLast);
        self.last_query_retry = Instant::now();
    }

    /// Requests every instance in `[from, through]` that isn't already
    /// delivered, buffered, or already pending, pausing briefly every
    /// `CATCHUP_BATCH_SIZE` sends.
    fn request_catchup(&mut self, from: Instance, through: Instance) {
        if through < from {
            return;
        }

        let mut sent = 0usize;
        for i in from..=through {
            if i < self.global_next_seq
                || self.instance_buffer.contains_key(&i)
                || self.catchup_pending.contains(&i)
            {
                continue;
            }

            self.catchup_pending.insert(i);
            self.transport
                .send(self.acceptors_addr, &Message::CatchUp { instance: i });

            sent += 1;
            if sent % CATCHUP_BATCH_SIZE == 0 {
                std::thread::sleep(CATCHUP_BATCH_PAUSE);
            }
        }

        self.last_catchup_retry = Instant::now();
    }

    fn resend_pending_catchups(&mut self) {
        let pending: Vec<Instance> = self.catchup_pending.iter().copied().collect();
        let mut sent = 0usize;
        for i in pending {
            self.transport
                .send(self.acceptors_addr, &Message::CatchUp { instance: i });
            sent += 1;
            if sent % CATCHUP_BATCH_SIZE == 0 {
                std::thread::sleep(CATCHUP_BATCH_PAUSE);
            }
        }
        self.last_catchup_retry = Instant::now();
    }

    fn handle_last_resp(&mut self, max_instance: Instance) {
        if max_instance >= self.global_next_seq {
            self.request_catchup(self.global_next_seq, max_instance);
        }
    }

    fn handle_accepted(&mut self, v_rnd: Round, v_val: Batch, instance: Instance, src: SocketAddr) {
        if instance < self.global_next_seq {
            return; // already delivered
        }

        let per_instance = self.quorum_2b.entry(instance).or_default();
        let acceptors = per_instance.entry((v_rnd, v_val.clone())).or_default();
        acceptors.insert(src);

        if acceptors.len() >= self.majority {
            self.quorum_2b.remove(&instance);
            self.on_chosen(instance, v_val);
        }
    }

    fn on_chosen(&mut self, instance: Instance, value: Batch) {
        if instance < self.global_next_seq {
            return;
        }

        self.catchup_pending.remove(&instance);

        if instance > self.global_next_seq {
            self.request_catchup(self.global_next_seq, instance - 1);
        }

        self.instance_buffer.entry(instance).or_insert(value);
        self.drain();
    }

    fn handle_catch_up_resp(&mut self, instance: Instance, value: Batch) {
        self.catchup_pending.remove(&instance);
        if instance >= self.global_next_seq && !self.instance_buffer.contains_key(&instance) {
            self.instance_buffer.insert(instance, value);
            self.drain();
        }
    }

    /// Delivers every contiguous instance starting at global_next_seq.
    fn drain(&mut self) {
        while let Some(value) = self.instance_buffer.remove(&self.global_next_seq) {
            self.deliver(value);
            self.global_next_seq += 1;
        }
    }

    /// Unpacks a chosen batch into the per-client buffer, then drains
    /// whatever client sequences are now contiguous: the instance
    /// buffer gives consensus-level total order, the client buffer
    /// gives per-client FIFO within and across batches.
    fn deliver(&mut self, batch: Batch) {
        let mut touched: HashSet<NodeId> = HashSet::new();
        for request in batch {
            touched.insert(request.client_id);
            self.client_buffer
                .insert((request.client_id, request.msg_num), request.value);
        }

        for client_id in touched {
            let next = self.client_next_seq.entry(client_id).or_insert(0);
            while let Some(value) = self.client_buffer.remove(&(client_id, *next)) {
                (self.sink)(&value);
                *next += 1;
            }
        }
    }

    fn on_idle_tick(&mut self) {
        let now = Instant::now();

        if !self.catchup_pending.is_empty()
            && now.duration_since(self.last_catchup_retry) >= CATCHUP_RETRY_INTERVAL
        {
            self.resend_pending_catchups();
        }

        if now.duration_since(self.last_activity) >= QUERY_RETRY_INTERVAL
            && now.duration_since(self.last_query_retry) >= QUERY_RETRY_INTERVAL
        {
            self.send_query_last();
        }
    }

    fn handle_message(&mut self, msg: Message, src: SocketAddr) {
        self.last_activity = Instant::now();
        match msg {
            Message::AcceptedLearner {
                v_rnd,
                v_val,
                instance,
            } => self.handle_accepted(v_rnd, v_val, instance, src),
            Message::LastResp { max_instance } => self.handle_last_resp(max_instance),
            Message::CatchUpResp { instance, value } => self.handle_catch_up_resp(instance, value),
            other => warn!("[L={}] ignoring unexpected message {:?}", self.id, other),
        }
    }

    /// Runs this learner's single-threaded event loop forever: a
    /// startup QueryLast, then an indefinite poll loop driving the two
    /// retry timers on idle wakeups.
    pub fn run(&mut self) -> ! {
        info!("[L={}] learner listening", self.id);
        self.send_query_last();

        loop {
            match self.transport.recv_timeout(POLL_INTERVAL) {
                Some((msg, src)) => self.handle_message(msg, src),
                None => self.on_idle_tick(),
            }
        }
    }
}
