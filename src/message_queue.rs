/*!
 * # Message Queue Implementation
 *
 * Transport for deferred work (report emails, nightly summary jobs). The
 * in-memory backend serves development and tests; the Redis backend serves
 * deployments where workers may run in a separate process.
 */

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Message queue errors
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl From<MessageQueueError> for ServiceError {
    fn from(e: MessageQueueError) -> Self {
        ServiceError::QueueError(e.to_string())
    }
}

/// Message envelope for queue items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Message {
    pub fn new(topic: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            payload,
            timestamp: chrono::Utc::now(),
            retry_count: 0,
            max_retries: 3,
        }
    }

    /// Whether this message still has delivery attempts left.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Message queue trait for different implementations
///
/// `subscribe` pops one message (None when the topic is idle). A consumer
/// that fails hands the message back through `nack`; the queue requeues it
/// with an incremented retry count, or drops it once retries are exhausted.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;
    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;
    async fn nack(&self, message: Message) -> Result<bool, MessageQueueError>;
}

/// In-memory message queue implementation
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    queues: Arc<Mutex<std::collections::HashMap<String, VecDeque<Message>>>>,
    max_size: usize,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(std::collections::HashMap::new())),
            max_size: 1000,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(std::collections::HashMap::new())),
            max_size,
        }
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues
            .entry(message.topic.clone())
            .or_insert_with(VecDeque::new);

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.get_mut(topic) {
            Ok(queue.pop_front())
        } else {
            Ok(None)
        }
    }

    async fn ack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        // Popping on subscribe already removed the message
        Ok(())
    }

    async fn nack(&self, mut message: Message) -> Result<bool, MessageQueueError> {
        if !message.can_retry() {
            return Ok(false);
        }
        message.retry_count += 1;
        self.publish(message).await?;
        Ok(true)
    }
}

/// Redis-backed queue. One list per topic, keys namespaced so several
/// deployments can share an instance. `BRPOP` with a short block timeout
/// keeps consumers cheap while staying responsive.
#[derive(Clone)]
pub struct RedisMessageQueue {
    manager: redis::aio::ConnectionManager,
    namespace: String,
    block_timeout_secs: usize,
}

impl RedisMessageQueue {
    pub async fn connect(
        redis_url: &str,
        namespace: impl Into<String>,
        block_timeout_secs: u64,
    ) -> Result<Self, MessageQueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;
        let manager = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;
        Ok(Self {
            manager,
            namespace: namespace.into(),
            block_timeout_secs: block_timeout_secs as usize,
        })
    }

    fn key(&self, topic: &str) -> String {
        format!("{}:{}", self.namespace, topic)
    }
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| MessageQueueError::SerializationError(e.to_string()))?;
        let mut conn = self.manager.clone();
        conn.lpush::<_, _, ()>(self.key(&message.topic), payload)
            .await
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut conn = self.manager.clone();
        let popped: Option<(String, String)> = conn
            .brpop(self.key(topic), self.block_timeout_secs)
            .await
            .map_err(|e| MessageQueueError::ConnectionError(e.to_string()))?;

        match popped {
            None => Ok(None),
            Some((_key, raw)) => {
                let message = serde_json::from_str(&raw)
                    .map_err(|e| MessageQueueError::SerializationError(e.to_string()))?;
                Ok(Some(message))
            }
        }
    }

    async fn ack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        // BRPOP already removed the message
        Ok(())
    }

    async fn nack(&self, mut message: Message) -> Result<bool, MessageQueueError> {
        if !message.can_retry() {
            return Ok(false);
        }
        message.retry_count += 1;
        self.publish(message).await?;
        Ok(true)
    }
}

/// Mock message queue for testing
#[cfg(test)]
pub struct MockMessageQueue {
    published_messages: Arc<Mutex<Vec<Message>>>,
}

#[cfg(test)]
impl MockMessageQueue {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_published_messages(&self) -> Vec<Message> {
        self.published_messages.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl MessageQueue for MockMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<Option<Message>, MessageQueueError> {
        Ok(None)
    }

    async fn ack(&self, _message_id: &Uuid) -> Result<(), MessageQueueError> {
        Ok(())
    }

    async fn nack(&self, _message: Message) -> Result<bool, MessageQueueError> {
        Ok(false)
    }
}
