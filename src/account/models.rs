//! Data models for accounts and the transfer log

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::validation::{AccountName, validate_initial_balance};
use crate::core_types::{AccountId, TransferLogId};
use crate::error::LedgerError;

/// Account row
///
/// `balance` is never negative at any externally observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Input for account creation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAccount {
    pub name: String,
    #[serde(default)]
    pub initial_balance: Decimal,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, initial_balance: Decimal) -> Self {
        Self {
            name: name.into(),
            initial_balance,
        }
    }

    /// Validate and normalize the input
    pub fn validate(&self) -> Result<(AccountName, Decimal), LedgerError> {
        let name = AccountName::new(&self.name)?;
        let balance = validate_initial_balance(self.initial_balance)?;
        Ok((name, balance))
    }
}

/// Committed transfer record (immutable, append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLogEntry {
    pub id: TransferLogId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Decimal,
    pub sender_balance_before: Decimal,
    pub receiver_balance_before: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TransferLogEntry {
    /// Stable ordering key: time first, id as tiebreak
    pub fn order_key(&self) -> (DateTime<Utc>, TransferLogId) {
        (self.created_at, self.id)
    }
}

/// Transfer log entry before the store assigns its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransferLog {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Decimal,
    pub sender_balance_before: Decimal,
    pub receiver_balance_before: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewTransferLog {
    pub fn with_id(self, id: TransferLogId) -> TransferLogEntry {
        TransferLogEntry {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            sender_balance_before: self.sender_balance_before,
            receiver_balance_before: self.receiver_balance_before,
            created_at: self.created_at,
        }
    }
}

/// Half-open UTC range `[start, end)` covering one calendar day
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Convert an account id to its `BIGINT` column value.
///
/// Ids outside the column range cannot exist, so they resolve to
/// `AccountNotFound`.
pub(crate) fn db_id(id: AccountId) -> Result<i64, LedgerError> {
    i64::try_from(id).map_err(|_| LedgerError::AccountNotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_account_validate() {
        let (name, balance) = NewAccount::new(" alice ", dec!(100)).validate().unwrap();
        assert_eq!(name.as_str(), "alice");
        assert_eq!(balance, dec!(100));

        let err = NewAccount::new("bob", dec!(-1)).validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = NewAccount::new("", dec!(1)).validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAccount(_)));
    }

    #[test]
    fn test_new_account_default_balance() {
        let req: NewAccount = serde_json::from_str(r#"{"name":"dave"}"#).unwrap();
        assert_eq!(req.initial_balance, Decimal::ZERO);
    }

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_with_id_and_order_key() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entry = NewTransferLog {
            sender_id: 1,
            receiver_id: 2,
            amount: dec!(40),
            sender_balance_before: dec!(100),
            receiver_balance_before: dec!(0),
            created_at: at,
        }
        .with_id(9);

        assert_eq!(entry.id, 9);
        assert_eq!(entry.order_key(), (at, 9));
    }

    #[test]
    fn test_db_id_range() {
        assert_eq!(db_id(42).unwrap(), 42);
        assert_eq!(db_id(u64::MAX).unwrap_err(), LedgerError::AccountNotFound(u64::MAX));
    }
}
