//! Asynchronous transfer path
//!
//! Producers publish a [`TransferMessage`] onto a [`TransferQueue`]; the
//! [`TransferConsumer`] pulls raw payloads, decodes them and forwards each
//! one to the transfer coordinator. Delivery is at-most-once from the
//! consumer's point of view: a message that fails is logged and dropped.
//! Messages carry no idempotency key, so a redelivered payload would be
//! applied twice.

pub mod consumer;
pub mod memory;
pub mod redis_queue;

pub use consumer::{ConsumerStats, TransferConsumer};
pub use memory::MemoryTransferQueue;
pub use redis_queue::RedisTransferQueue;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::core_types::AccountId;
use crate::error::LedgerError;

/// Default queue name
pub const DEFAULT_QUEUE_NAME: &str = "transaction_queue";

/// Wire format of an asynchronous transfer request
///
/// ```json
/// {"sender_id": 1, "receiver_id": 2, "amount": 40.0}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: f64,
}

impl TransferMessage {
    /// Build a message from a decimal amount
    pub fn new(
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        let amount = amount.to_f64().ok_or_else(|| {
            LedgerError::InvalidAmount(format!("{} has no float representation", amount))
        })?;
        Ok(Self {
            sender_id,
            receiver_id,
            amount,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(self)
            .map_err(|e| LedgerError::QueueFailure(format!("Failed to encode message: {}", e)))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Amount as a decimal; NaN and infinities are rejected
    pub fn decimal_amount(&self) -> Result<Decimal, LedgerError> {
        Decimal::from_f64(self.amount)
            .map(|d| d.normalize())
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{} is not a finite amount", self.amount)))
    }
}

/// FIFO transport for transfer messages
#[async_trait]
pub trait TransferQueue: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn publish(&self, message: &TransferMessage) -> Result<(), LedgerError>;

    /// Next raw payload; `Ok(None)` when nothing arrived within the poll
    /// timeout or the queue is closed
    async fn next(&self) -> Result<Option<Vec<u8>>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wire_format() {
        let msg = TransferMessage::decode(br#"{"sender_id":1,"receiver_id":2,"amount":40.5}"#).unwrap();
        assert_eq!(msg.sender_id, 1);
        assert_eq!(msg.receiver_id, 2);
        assert_eq!(msg.decimal_amount().unwrap(), dec!(40.5));

        let encoded = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert_eq!(encoded, r#"{"sender_id":1,"receiver_id":2,"amount":40.5}"#);
    }

    #[test]
    fn test_decimal_amount_is_exact_for_short_fractions() {
        let msg = TransferMessage::new(1, 2, dec!(0.1)).unwrap();
        assert_eq!(msg.decimal_amount().unwrap(), dec!(0.1));
    }

    #[test]
    fn test_non_finite_amount_rejected() {
        for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let msg = TransferMessage {
                sender_id: 1,
                receiver_id: 2,
                amount,
            };
            assert!(matches!(
                msg.decimal_amount(),
                Err(LedgerError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn test_malformed_payload() {
        assert!(TransferMessage::decode(b"not json").is_err());
        assert!(TransferMessage::decode(br#"{"sender_id":-1,"receiver_id":2,"amount":1}"#).is_err());
    }
}
