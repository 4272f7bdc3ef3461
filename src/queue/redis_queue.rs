//! Redis list transport: `LPUSH` to publish, `BRPOP` to consume

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{TransferMessage, TransferQueue};
use crate::error::LedgerError;

/// Transfer queue on a Redis list
///
/// `BRPOP` holds its connection until it returns, so consumers should own a
/// queue instance separate from the one producers publish through.
#[derive(Clone)]
pub struct RedisTransferQueue {
    conn: MultiplexedConnection,
    queue_name: String,
    poll_timeout: Duration,
}

impl RedisTransferQueue {
    pub async fn connect(
        redis_url: &str,
        queue_name: impl Into<String>,
        poll_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = redis::Client::open(redis_url).map_err(queue_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(queue_error)?;

        let queue_name = queue_name.into();
        tracing::info!(queue = %queue_name, "Redis transfer queue connected");
        Ok(Self {
            conn,
            queue_name,
            poll_timeout,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

fn queue_error(e: redis::RedisError) -> LedgerError {
    LedgerError::QueueFailure(e.to_string())
}

#[async_trait]
impl TransferQueue for RedisTransferQueue {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, message: &TransferMessage) -> Result<(), LedgerError> {
        let payload = message.encode()?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .lpush(&self.queue_name, payload)
            .await
            .map_err(queue_error)?;
        Ok(())
    }

    async fn next(&self) -> Result<Option<Vec<u8>>, LedgerError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, Vec<u8>)> = conn
            .brpop(&self.queue_name, self.poll_timeout.as_secs_f64())
            .await
            .map_err(queue_error)?;
        Ok(popped.map(|(_, payload)| payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379/15";

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_publish_then_pop() {
        let queue = RedisTransferQueue::connect(
            TEST_REDIS_URL,
            "transaction_queue_test",
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let msg = TransferMessage {
            sender_id: 1,
            receiver_id: 2,
            amount: 3.5,
        };
        queue.publish(&msg).await.unwrap();

        let payload = queue.next().await.unwrap().unwrap();
        assert_eq!(TransferMessage::decode(&payload).unwrap(), msg);
        assert!(queue.next().await.unwrap().is_none());
    }
}
