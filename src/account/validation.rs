//! Input validation for new accounts
//!
//! Validated types keep their fields private so the only way to build one
//! is through `new()`.

use std::fmt;

use rust_decimal::Decimal;

use crate::error::LedgerError;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for account creation input
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Initial balance must not be negative: got {0}")]
    NegativeBalance(Decimal),
}

impl From<ValidationError> for LedgerError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::NegativeBalance(_) => LedgerError::InvalidAmount(e.to_string()),
            _ => LedgerError::InvalidAccount(e.to_string()),
        }
    }
}

// ============================================================================
// AccountName - Validated Account Label (Private Fields)
// ============================================================================

/// Validated account name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountName(String);

impl AccountName {
    pub const MAX_LEN: usize = 64;

    /// Create a new validated AccountName
    ///
    /// # Validation Rules
    /// - Surrounding whitespace is trimmed
    /// - Length: 1-64 characters
    /// - No control characters
    ///
    /// # Examples
    /// ```
    /// use credit_ledger::account::validation::AccountName;
    ///
    /// let name = AccountName::new("  alice ").unwrap();
    /// assert_eq!(name.as_str(), "alice");
    ///
    /// assert!(AccountName::new("").is_err());
    /// ```
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        let len = name.chars().count();

        if len == 0 || len > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "name",
                min: 1,
                max: Self::MAX_LEN,
                actual: len,
            });
        }

        if name.chars().any(char::is_control) {
            return Err(ValidationError::InvalidFormat {
                field: "name",
                value: name.escape_debug().to_string(),
                expected: "printable characters only",
            });
        }

        Ok(Self(name.to_string()))
    }

    /// Get the validated name as &str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an opening balance (zero is allowed)
pub fn validate_initial_balance(balance: Decimal) -> Result<Decimal, ValidationError> {
    if balance.is_sign_negative() && !balance.is_zero() {
        return Err(ValidationError::NegativeBalance(balance));
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_name_valid() {
        assert!(AccountName::new("alice").is_ok());
        assert!(AccountName::new("Bob Smith").is_ok());
        assert!(AccountName::new("x").is_ok());
        assert!(AccountName::new(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_account_name_trimmed() {
        let name = AccountName::new("  carol\t").unwrap();
        assert_eq!(name.as_str(), "carol");
        assert_eq!(name.to_string(), "carol");
    }

    #[test]
    fn test_account_name_invalid_length() {
        let err = AccountName::new("   ").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLength { actual: 0, .. }));

        let err = AccountName::new(&"a".repeat(65)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidLength { actual: 65, .. }));
    }

    #[test]
    fn test_account_name_control_chars() {
        let err = AccountName::new("ali\u{0}ce").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_initial_balance() {
        assert_eq!(validate_initial_balance(dec!(0)).unwrap(), dec!(0));
        assert_eq!(validate_initial_balance(dec!(12.5)).unwrap(), dec!(12.5));
        assert_eq!(
            validate_initial_balance(dec!(-0.01)).unwrap_err(),
            ValidationError::NegativeBalance(dec!(-0.01))
        );
    }

    #[test]
    fn test_into_ledger_error() {
        let err: LedgerError = ValidationError::NegativeBalance(dec!(-1)).into();
        assert_eq!(err.code(), "INVALID_AMOUNT");

        let err: LedgerError = AccountName::new("").unwrap_err().into();
        assert_eq!(err.code(), "INVALID_ACCOUNT");
    }
}
