use sqlx::PgPool;

use crate::error::LedgerError;

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    balance     NUMERIC(38, 18) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#;

const CREATE_TRANSFER_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_log (
    id                       BIGSERIAL PRIMARY KEY,
    sender_id                BIGINT NOT NULL REFERENCES accounts (id),
    receiver_id              BIGINT NOT NULL REFERENCES accounts (id),
    amount                   NUMERIC(38, 18) NOT NULL CHECK (amount > 0),
    sender_balance_before    NUMERIC(38, 18) NOT NULL,
    receiver_balance_before  NUMERIC(38, 18) NOT NULL,
    created_at               TIMESTAMPTZ NOT NULL
)"#;

const CREATE_TRANSFER_LOG_SENDER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transfer_log_sender_created
    ON transfer_log (sender_id, created_at DESC, id DESC)"#;

/// Create the ledger tables if they do not exist yet
pub async fn init_schema(pool: &PgPool) -> Result<(), LedgerError> {
    tracing::info!("Initializing ledger schema...");

    for statement in [
        CREATE_ACCOUNTS_TABLE,
        CREATE_TRANSFER_LOG_TABLE,
        CREATE_TRANSFER_LOG_SENDER_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            LedgerError::StoreFailure(format!("Failed to initialize schema: {}", e))
        })?;
    }

    tracing::info!("Ledger schema initialized successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_enforces_non_negative_balance() {
        assert!(CREATE_ACCOUNTS_TABLE.contains("CHECK (balance >= 0)"));
        assert!(CREATE_TRANSFER_LOG_TABLE.contains("CHECK (amount > 0)"));
    }
}
