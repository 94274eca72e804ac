use crate::types::Message;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of an enqueue, reported so callers can log dropped backlog.
#[derive(Debug, Clone)]
pub struct QueueResult {
    pub was_queued: bool,
    pub messages_dropped: usize,
    pub current_size: usize,
    pub message_count: usize,
}

#[derive(Debug, Clone)]
struct QueuedMessageInternal {
    message: Message,
    queued_at: Instant,
    size: usize,
}

/// FIFO backlog for publishes attempted while the transport is down.
/// Bounded by message count and total payload bytes; the oldest
/// entries are dropped first when either bound is hit.
#[derive(Debug)]
pub struct PendingQueue {
    queue: VecDeque<QueuedMessageInternal>,
    max_messages: usize,
    max_size: usize,
    current_size: usize,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(1000, 1024 * 1024)
    }
}

impl PendingQueue {
    #[must_use]
    pub fn new(max_messages: usize, max_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_messages,
            max_size,
            current_size: 0,
        }
    }

    pub fn enqueue(&mut self, message: Message) -> QueueResult {
        let size = message.topic.len() + message.payload.len();

        if size > self.max_size {
            return QueueResult {
                was_queued: false,
                messages_dropped: 0,
                current_size: self.current_size,
                message_count: self.queue.len(),
            };
        }

        let mut messages_dropped = 0;
        while !self.queue.is_empty()
            && (self.queue.len() >= self.max_messages || self.current_size + size > self.max_size)
        {
            if let Some(removed) = self.queue.pop_front() {
                self.current_size -= removed.size;
                messages_dropped += 1;
            }
        }

        self.queue.push_back(QueuedMessageInternal {
            message,
            queued_at: Instant::now(),
            size,
        });
        self.current_size += size;

        QueueResult {
            was_queued: true,
            messages_dropped,
            current_size: self.current_size,
            message_count: self.queue.len(),
        }
    }

    /// The next message without removing it, so a failed handoff to
    /// the transport does not lose it.
    #[must_use]
    pub fn peek(&self) -> Option<&Message> {
        self.queue.front().map(|internal| &internal.message)
    }

    #[must_use]
    pub fn dequeue(&mut self) -> Option<Message> {
        let internal = self.queue.pop_front()?;
        self.current_size -= internal.size;
        Some(internal.message)
    }

    #[must_use]
    pub fn dequeue_batch(&mut self, limit: usize) -> Vec<Message> {
        let mut messages = Vec::with_capacity(limit.min(self.queue.len()));
        for _ in 0..limit {
            if let Some(message) = self.dequeue() {
                messages.push(message);
            } else {
                break;
            }
        }
        messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.current_size
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.current_size = 0;
    }

    pub fn remove_older_than(&mut self, queue_timeout: Duration) {
        let now = Instant::now();
        let current_size = &mut self.current_size;

        self.queue.retain(|internal| {
            let keep = now.duration_since(internal.queued_at) <= queue_timeout;
            if !keep {
                *current_size -= internal.size;
            }
            keep
        });
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            message_count: self.queue.len(),
            total_size: self.current_size,
            max_messages: self.max_messages,
            max_size: self.max_size,
            oldest_message_age: self.queue.front().map(|m| m.queued_at.elapsed()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub message_count: usize,
    pub total_size: usize,
    pub max_messages: usize,
    pub max_size: usize,
    pub oldest_message_age: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QoS;

    fn test_message(idx: u8) -> Message {
        let mut message = Message::new(format!("test/{idx}"), vec![idx]);
        message.qos = QoS::AtLeastOnce;
        message
    }

    #[test]
    fn test_queue_basic_operations() {
        let mut queue = PendingQueue::new(10, 1024);

        queue.enqueue(Message::new("test/1", vec![1, 2, 3]));
        queue.enqueue(Message::new("test/2", vec![4, 5, 6]));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.size(), 18);
        assert_eq!(queue.peek().unwrap().topic, "test/1");

        let dequeued = queue.dequeue().unwrap();
        assert_eq!(dequeued.topic, "test/1");
        assert_eq!(queue.len(), 1);

        let dequeued = queue.dequeue().unwrap();
        assert_eq!(dequeued.topic, "test/2");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_at_message_cap() {
        let mut queue = PendingQueue::new(2, 1024);

        for i in 0u8..3 {
            let result = queue.enqueue(test_message(i));
            assert!(result.was_queued);
        }

        assert_eq!(queue.len(), 2);
        let messages = queue.dequeue_batch(10);
        assert_eq!(messages[0].topic, "test/1");
        assert_eq!(messages[1].topic, "test/2");
    }

    #[test]
    fn test_queue_drops_oldest_at_size_cap() {
        let mut queue = PendingQueue::new(10, 20);

        queue.enqueue(Message::new("test", vec![0; 10]));
        let result = queue.enqueue(Message::new("test2", vec![0; 5]));
        assert!(result.was_queued);
        assert_eq!(result.messages_dropped, 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().unwrap().topic, "test2");
    }

    #[test]
    fn test_queue_oversized_message_refused() {
        let mut queue = PendingQueue::new(10, 20);
        let result = queue.enqueue(Message::new("test", vec![0; 50]));
        assert!(!result.was_queued);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_clear() {
        let mut queue = PendingQueue::new(10, 1024);
        for i in 0u8..3 {
            queue.enqueue(test_message(i));
        }

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_queue_stats() {
        let mut queue = PendingQueue::new(10, 1024);
        queue.enqueue(Message::new("test", vec![1, 2, 3]));

        let stats = queue.stats();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.total_size, 7);
        assert_eq!(stats.max_messages, 10);
        assert!(stats.oldest_message_age.is_some());
    }

    #[test]
    fn test_remove_older_than_zero_empties_queue() {
        let mut queue = PendingQueue::new(10, 1024);
        queue.enqueue(test_message(0));
        std::thread::sleep(Duration::from_millis(5));
        queue.remove_older_than(Duration::from_millis(1));
        assert!(queue.is_empty());
        assert_eq!(queue.size(), 0);
    }
}
