//! Outbound command queueing: priority ordering with FIFO tie-breaking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::address::DeviceId;
use crate::code::Code;
use crate::verb::Verb;

/// Command priority; higher sorts first. Matches the original's priority
/// classes (urgent bind traffic above routine polling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// An outbound command awaiting transmission.
#[derive(Debug, Clone)]
pub struct Command {
    pub priority: Priority,
    pub verb: Verb,
    pub code: Code,
    pub dst: DeviceId,
    pub payload_hex: String,
    /// Remaining retry attempts if no matching response arrives in time.
    pub retries: u8,
    /// How long to wait for a correlated response before retrying.
    pub timeout: Duration,
    seq: u64,
}

impl Command {
    pub fn new(priority: Priority, verb: Verb, code: Code, dst: DeviceId, payload_hex: String, retries: u8, timeout: Duration) -> Command {
        Command {
            priority,
            verb,
            code,
            dst,
            payload_hex,
            retries,
            timeout,
            seq: 0,
        }
    }

    /// The response verb a sent command of this shape expects to
    /// correlate against, for retry purposes: `RQ` waits for a matching
    /// `RP`; `W` (a setpoint/zone-mode write) and `I` (including the bind
    /// handshake's Offer/Accept/Confirm, carried as `I`-verb frames) wait
    /// for their own echo back off the wire. `RP` is a terminal response
    /// and expects nothing further.
    pub fn expected_response_verb(&self) -> Option<Verb> {
        match self.verb {
            Verb::RQ => Some(Verb::RP),
            Verb::W | Verb::I => Some(Verb::I),
            Verb::RP => None,
        }
    }
}

/// An entry in the priority queue: wraps a [`Command`] with a monotonic
/// submission sequence so same-priority commands stay FIFO (ties are
/// "ties broken by submission order").
#[derive(Debug, Clone)]
struct QueueEntry(Command);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.seq == other.0.seq
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins; for equal
        // priority, the *earlier* submission (lower seq) must sort as
        // greater so it pops first.
        self.0.priority.cmp(&other.0.priority).then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// A priority-ordered outbound queue guarded by a single mutex, per
/// guarded independently of the entity registry's own mutex.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    heap: Mutex<BinaryHeap<QueueEntry>>,
    next_seq: std::sync::atomic::AtomicU64,
}

impl OutboundQueue {
    pub fn new() -> OutboundQueue {
        OutboundQueue::default()
    }

    /// Enqueues a command, stamping it with the next submission sequence.
    pub async fn push(&self, mut command: Command) {
        command.seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.heap.lock().await.push(QueueEntry(command));
    }

    /// Dequeues the highest-priority, earliest-submitted command.
    pub async fn pop(&self) -> Option<Command> {
        self.heap.lock().await.pop().map(|entry| entry.0)
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// A command in flight, awaiting a correlated response before its
/// deadline.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub command: Command,
    pub deadline: Instant,
}

impl PendingCommand {
    pub fn new(command: Command) -> PendingCommand {
        let deadline = Instant::now() + command.timeout;
        PendingCommand { command, deadline }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(priority: Priority) -> Command {
        Command::new(priority, Verb::W, Code::from_u16(0x2309), DeviceId::absent(), String::new(), 3, Duration::from_secs(3))
    }

    #[tokio::test]
    async fn higher_priority_pops_first() {
        let queue = OutboundQueue::new();
        queue.push(cmd(Priority::Low)).await;
        queue.push(cmd(Priority::Urgent)).await;
        queue.push(cmd(Priority::Normal)).await;

        assert_eq!(queue.pop().await.unwrap().priority, Priority::Urgent);
        assert_eq!(queue.pop().await.unwrap().priority, Priority::Normal);
        assert_eq!(queue.pop().await.unwrap().priority, Priority::Low);
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let queue = OutboundQueue::new();
        for i in 0..3u8 {
            let mut c = cmd(Priority::Normal);
            c.retries = i;
            queue.push(c).await;
        }
        assert_eq!(queue.pop().await.unwrap().retries, 0);
        assert_eq!(queue.pop().await.unwrap().retries, 1);
        assert_eq!(queue.pop().await.unwrap().retries, 2);
    }

    #[test]
    fn pending_command_expires_after_timeout() {
        let pending = PendingCommand::new(cmd(Priority::High));
        assert!(!pending.is_expired(Instant::now()));
        assert!(pending.is_expired(Instant::now() + Duration::from_secs(10)));
    }
}
