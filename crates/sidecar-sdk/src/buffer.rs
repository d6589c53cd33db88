//! Bounded outbound message buffer with a drop-oldest drain policy

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A message waiting to be written to the agent.
///
/// Immutable once enqueued. Signal payloads are pre-encoded, already-framed
/// bytes built once (hello and error frames); data payloads are serialized
/// into the data envelope at send time.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Pre-encoded control frame, written to the wire as-is
    Signal(Bytes),

    /// Application payload, wrapped into the data envelope when sent
    Data {
        /// JSON payload supplied by the application
        payload: Value,
        /// Optional routing tag
        channel: Option<String>,
    },
}

/// An entry in the outbound buffer
#[derive(Debug, Clone)]
pub enum Entry {
    /// A message bound for the wire
    Message(OutboundMessage),

    /// Shutdown sentinel: unblocks a parked dequeue and must never be
    /// delivered to the wire
    Shutdown,
}

/// Bounded FIFO of pending outbound messages.
///
/// Concurrent producers enqueue from arbitrary application tasks; the sender
/// is the single dequeuing consumer and the drainer the single opportunistic
/// evictor. When the buffer is full, `push` signals the drainer and then
/// waits for space, which is the backpressure contract for producers under
/// sustained overflow.
pub struct OutboundBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<Entry>>,
    readable: Notify,
    writable: Notify,
    overflow: Notify,
}

impl OutboundBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            readable: Notify::new(),
            writable: Notify::new(),
            overflow: Notify::new(),
        }
    }

    /// Enqueue a message.
    ///
    /// Inserts without waiting when a slot is free. When full, notifies the
    /// drainer (best-effort) and then waits until space exists, so the
    /// caller may stall under sustained overflow.
    pub async fn push(&self, msg: OutboundMessage) {
        let mut entry = Some(Entry::Message(msg));
        loop {
            {
                let mut queue = self.queue.lock().expect("buffer lock poisoned");
                if queue.len() < self.capacity {
                    queue.push_back(entry.take().expect("entry consumed twice"));
                    self.readable.notify_one();
                    return;
                }
            }
            self.overflow.notify_one();
            self.writable.notified().await;
        }
    }

    /// Dequeue the next entry, waiting until one exists.
    ///
    /// Single-consumer: only the sender task calls this.
    pub async fn pop(&self) -> Entry {
        loop {
            {
                let mut queue = self.queue.lock().expect("buffer lock poisoned");
                if let Some(entry) = queue.pop_front() {
                    self.writable.notify_one();
                    return entry;
                }
            }
            self.readable.notified().await;
        }
    }

    /// Push the shutdown sentinel without waiting.
    ///
    /// If the buffer is full the oldest message is discarded to make room;
    /// buffered messages are being abandoned at shutdown anyway.
    pub fn push_shutdown(&self) {
        let mut queue = self.queue.lock().expect("buffer lock poisoned");
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(Entry::Shutdown);
        self.readable.notify_one();
    }

    /// Evict the oldest entry if the buffer is still full.
    ///
    /// The eviction may be skipped: between the overflow signal and this
    /// check another consumer may have freed a slot, in which case nothing
    /// is evicted. The policy keeps the buffer near capacity under overflow;
    /// it does not guarantee one eviction per overflow event.
    pub fn evict_oldest_if_full(&self) -> bool {
        let evicted = {
            let mut queue = self.queue.lock().expect("buffer lock poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            }
        };
        if evicted {
            tracing::debug!("Outbound buffer full, dropped oldest message");
            self.writable.notify_one();
        }
        evicted
    }

    /// Wait for an overflow signal from a producer
    pub async fn overflow_signaled(&self) {
        self.overflow.notified().await;
    }

    /// Wake the drainer task (used at shutdown)
    pub fn signal_overflow(&self) {
        self.overflow.notify_one();
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.queue.lock().expect("buffer lock poisoned").len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drainer task: keeps the buffer at bay under producer overflow.
///
/// Sleeps until a producer signals overflow, then drops exactly one oldest
/// entry if the buffer is still observed full.
pub async fn run_drainer(buffer: std::sync::Arc<OutboundBuffer>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = buffer.overflow_signaled() => {
                buffer.evict_oldest_if_full();
            }
        }
    }
    tracing::debug!("Drainer task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn data_msg(n: u64) -> OutboundMessage {
        OutboundMessage::Data {
            payload: json!({ "n": n }),
            channel: None,
        }
    }

    fn payload_n(entry: Entry) -> u64 {
        match entry {
            Entry::Message(OutboundMessage::Data { payload, .. }) => {
                payload["n"].as_u64().unwrap()
            }
            other => panic!("Unexpected entry: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let buffer = OutboundBuffer::new(4);
        for n in 0..4 {
            buffer.push(data_msg(n)).await;
        }
        for n in 0..4 {
            assert_eq!(payload_n(buffer.pop().await), n);
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity_with_drainer() {
        let buffer = Arc::new(OutboundBuffer::new(3));
        let shutdown = CancellationToken::new();
        let drainer = tokio::spawn(run_drainer(Arc::clone(&buffer), shutdown.clone()));

        for n in 0..50 {
            buffer.push(data_msg(n)).await;
            assert!(buffer.len() <= 3);
        }

        shutdown.cancel();
        drainer.await.unwrap();

        // The survivors are the newest messages, still in order
        let mut last = payload_n(buffer.pop().await);
        while !buffer.is_empty() {
            let next = payload_n(buffer.pop().await);
            assert!(next > last);
            last = next;
        }
        assert_eq!(last, 49);
    }

    #[tokio::test]
    async fn test_push_blocks_until_space_without_drainer() {
        let buffer = Arc::new(OutboundBuffer::new(1));
        buffer.push(data_msg(0)).await;

        let producer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.push(data_msg(1)).await })
        };

        // The producer must stall: no drainer and no consumer
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(buffer.len(), 1);

        assert_eq!(payload_n(buffer.pop().await), 0);
        producer.await.unwrap();
        assert_eq!(payload_n(buffer.pop().await), 1);
    }

    #[tokio::test]
    async fn test_eviction_skipped_when_not_full() {
        let buffer = OutboundBuffer::new(2);
        buffer.push(data_msg(0)).await;
        assert!(!buffer.evict_oldest_if_full());
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_sentinel_fits_in_full_buffer() {
        let buffer = OutboundBuffer::new(1);
        buffer.push(data_msg(0)).await;
        buffer.push_shutdown();
        assert!(matches!(buffer.pop().await, Entry::Shutdown));
    }

    #[tokio::test]
    async fn test_sentinel_unblocks_parked_pop() {
        let buffer = Arc::new(OutboundBuffer::new(2));
        let consumer = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move { buffer.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.push_shutdown();
        assert!(matches!(consumer.await.unwrap(), Entry::Shutdown));
    }
}
