//! Message queues for inter-component communication.
//!
//! Provides both point-to-point (Queue) and broadcast (BroadcastQueue) messaging.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::{ReplayflowError, Result};

/// Bounded MPMC (multi-producer, multi-consumer) queue.
///
/// Used for the replay command queue: commands from the presentation layer are
/// consumed by exactly one receiver, the replay dispatcher.
/// Backed by flume so that senders may live on any thread.
#[derive(Clone)]
pub struct Queue<T> {
    receiver: Arc<flume::Receiver<T>>,
    sender: Arc<flume::Sender<T>>,
}

#[allow(unused)]
impl<T> Queue<T> {
    /// create a new queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, rx) = flume::bounded(cap);

        Arc::new(Self {
            receiver: Arc::new(rx),
            sender: Arc::new(tx),
        })
    }

    /// receive a message without waiting
    pub fn try_next(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// send a message to the queue
    pub fn send(
        &self,
        msg: T,
    ) -> Result<()> {
        self.sender.send(msg).map_err(|e| ReplayflowError::Queue(e.to_string()))
    }

    /// receive a message from the queue asynchronously
    pub async fn next_async(&self) -> Option<T> {
        self.receiver.recv_async().await.ok()
    }
}

/// Broadcast queue for one-to-many message distribution.
///
/// Used for the replay status stream where every async subscriber receives
/// every status.
/// Backed by tokio's broadcast channel.
#[derive(Clone)]
pub struct BroadcastQueue<T> {
    sender: Arc<broadcast::Sender<T>>,
}

impl<T: Clone> BroadcastQueue<T> {
    /// create a new broadcast queue
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(cap);

        Arc::new(Self {
            sender: Arc::new(tx),
        })
    }

    /// send a message to every current subscriber, returns how many received it
    pub fn send(
        &self,
        msg: T,
    ) -> usize {
        self.sender.send(msg).unwrap_or(0)
    }

    /// subscribe to the queue
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_send_and_try_next() {
        let queue = Queue::new(2);
        queue.send(1).unwrap();
        queue.send(2).unwrap();
        assert_eq!(queue.try_next(), Some(1));
        assert_eq!(queue.try_next(), Some(2));
        assert_eq!(queue.try_next(), None);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscriber() {
        let queue = BroadcastQueue::new(4);
        assert_eq!(queue.send("lost"), 0);

        let mut rx = queue.subscribe();
        assert_eq!(queue.send("seen"), 1);
        assert_eq!(rx.recv().await.unwrap(), "seen");
    }
}
