//! TCP flow table and in-order delivery.
//!
//! # Responsibilities
//! - Track one directed flow per (source, destination) pair
//! - Deliver payload in sequence order, trimming retransmissions
//! - Buffer out-of-order segments up to a limit, then skip the gap
//! - End a flow on FIN, RST or idleness
//!
//! A flow whose session has gone away keeps its entry and discards its
//! data until it ends, so no session ever starts mid-message.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::capture::TcpSegment;
use crate::forward::FlowIdentity;
use crate::observability::metrics;
use crate::reassembly::stream::FlowStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FlowKey {
    src: SocketAddr,
    dst: SocketAddr,
}

/// A flow seen for the first time, ready for a session.
#[derive(Debug)]
pub struct NewFlow {
    pub identity: FlowIdentity,
    pub stream: FlowStream,
}

/// `a` comes before `b` in wrapping sequence space.
fn seq_before(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[derive(Debug)]
struct Flow {
    next_seq: u32,
    isn: Option<u32>,
    fin_seq: Option<u32>,
    out_of_order: Vec<(u32, Bytes)>,
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    last_seen: Instant,
}

impl Flow {
    fn open(next_seq: u32, isn: Option<u32>, now: Instant) -> (Self, FlowStream) {
        let (tx, stream) = FlowStream::channel();
        let flow = Self {
            next_seq,
            isn,
            fin_seq: None,
            out_of_order: Vec::new(),
            tx: Some(tx),
            last_seen: now,
        };
        (flow, stream)
    }

    /// Accepts one segment. Returns true once the flow is complete.
    fn accept(&mut self, seg: TcpSegment, max_buffered: usize, now: Instant) -> bool {
        self.last_seen = now;
        let start = if seg.syn { seg.seq.wrapping_add(1) } else { seg.seq };
        if seg.fin {
            self.fin_seq = Some(start.wrapping_add(seg.payload.len() as u32));
        }
        if !seg.payload.is_empty() {
            self.offer(start, seg.payload, max_buffered);
        }
        self.fin_seq == Some(self.next_seq)
    }

    fn offer(&mut self, seq: u32, data: Bytes, max_buffered: usize) {
        if seq_before(self.next_seq, seq) {
            self.out_of_order.push((seq, data));
            if self.out_of_order.len() > max_buffered {
                self.skip_gap();
            }
            return;
        }
        self.deliver_from(seq, data);
        self.drain_buffered();
    }

    /// Delivers whatever part of `data` lies at or past `next_seq`.
    fn deliver_from(&mut self, seq: u32, mut data: Bytes) {
        let overlap = self.next_seq.wrapping_sub(seq) as usize;
        if overlap >= data.len() {
            return;
        }
        data = data.slice(overlap..);
        self.next_seq = self.next_seq.wrapping_add(data.len() as u32);
        self.deliver(data);
    }

    fn drain_buffered(&mut self) {
        while let Some(i) = self
            .out_of_order
            .iter()
            .position(|(seq, _)| !seq_before(self.next_seq, *seq))
        {
            let (seq, data) = self.out_of_order.swap_remove(i);
            self.deliver_from(seq, data);
        }
    }

    /// Gives up on the missing bytes and resumes at the earliest buffered segment.
    fn skip_gap(&mut self) {
        let earliest = self
            .out_of_order
            .iter()
            .map(|(seq, _)| *seq)
            .min_by_key(|seq| seq.wrapping_sub(self.next_seq));
        if let Some(seq) = earliest {
            metrics::record_reassembly_gap();
            tracing::debug!(
                missing = seq.wrapping_sub(self.next_seq),
                "Skipping sequence gap"
            );
            self.next_seq = seq;
            self.drain_buffered();
        }
    }

    fn deliver(&mut self, data: Bytes) {
        if let Some(tx) = &self.tx {
            if tx.send(data).is_err() {
                tracing::debug!("Flow session gone, discarding further data");
                self.tx = None;
            }
        }
    }
}

/// Flow table fed by captured segments.
#[derive(Debug)]
pub struct Assembler {
    flows: HashMap<FlowKey, Flow>,
    max_buffered: usize,
}

impl Assembler {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            flows: HashMap::new(),
            max_buffered,
        }
    }

    /// Feeds one segment. Returns the flow it opened, if any.
    pub fn ingest(&mut self, seg: TcpSegment, now: Instant) -> Option<NewFlow> {
        let key = FlowKey {
            src: seg.src,
            dst: seg.dst,
        };

        if seg.rst {
            if self.flows.remove(&key).is_some() {
                tracing::debug!(src = %key.src, dst = %key.dst, "Flow reset");
            }
            return None;
        }

        // A SYN that does not repeat the current one starts a new connection.
        if seg.syn {
            if let Some(flow) = self.flows.get(&key) {
                if flow.isn != Some(seg.seq) {
                    self.flows.remove(&key);
                }
            }
        }

        let mut opened = None;
        if !self.flows.contains_key(&key) {
            let (flow, stream) = if seg.syn {
                Flow::open(seg.seq.wrapping_add(1), Some(seg.seq), now)
            } else if !seg.payload.is_empty() {
                Flow::open(seg.seq, None, now)
            } else {
                return None;
            };
            self.flows.insert(key, flow);
            opened = Some(NewFlow {
                identity: FlowIdentity::new(key.src, key.dst),
                stream,
            });
        }

        let finished = self
            .flows
            .get_mut(&key)
            .map(|flow| flow.accept(seg, self.max_buffered, now))
            .unwrap_or(false);
        if finished {
            self.flows.remove(&key);
        }
        opened
    }

    /// Ends flows idle for at least `timeout`. Returns how many were dropped.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.flows.len();
        self.flows
            .retain(|_, flow| now.saturating_duration_since(flow.last_seen) < timeout);
        before - self.flows.len()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
