use async_trait::async_trait;
use sqlx::PgPool;

use crate::ledger::LedgerError;
use crate::models::accounts::{Account, NewAccount};

pub mod memory;

/// Single persisted table of accounts. Implementations guarantee that
/// `apply_mutation` calls for one `external_id` never interleave; nothing is
/// promised across accounts.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Idempotent creation: a second call for a known `external_id` returns
    /// the stored row with `created == false`. A concurrent referral-code
    /// collision surfaces as `Conflict` so the caller can regenerate.
    async fn get_or_create(&self, new: NewAccount) -> Result<(Account, bool), LedgerError>;

    async fn find_by_external_id(&self, external_id: &str)
        -> Result<Option<Account>, LedgerError>;

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, LedgerError>;

    /// Scoped read-modify-write, the sole write path for mutable account
    /// fields. An `Err` from the mutation leaves the stored row untouched.
    async fn apply_mutation<R, F>(
        &self,
        external_id: &str,
        mutation: F,
    ) -> Result<(Account, R), LedgerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Account) -> Result<R, LedgerError> + Send + 'static;

    async fn top_by_balance(&self, limit: i64) -> Result<Vec<Account>, LedgerError>;
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        balance BIGINT NOT NULL DEFAULT 0,
        referral_code TEXT NOT NULL UNIQUE,
        referred_by TEXT,
        referral_points BIGINT NOT NULL DEFAULT 0,
        last_mined TIMESTAMPTZ,
        last_spun TIMESTAMPTZ,
        last_spin_reward BIGINT NOT NULL DEFAULT 0,
        quests_completed TEXT[] NOT NULL DEFAULT '{}',
        wallet_address TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS accounts_balance_idx
        ON accounts (balance DESC, created_at ASC, id ASC)"#,
];

#[derive(Clone)]
pub struct PostgresAccountStore {
    conn: PgPool,
}

impl PostgresAccountStore {
    pub fn new(conn: PgPool) -> Self {
        PostgresAccountStore { conn }
    }

    /// Applies the schema at boot so a fresh database needs no out-of-band
    /// migration step.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.conn)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn classify_insert_error(e: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &e {
        if db.constraint() == Some("accounts_referral_code_key") {
            return LedgerError::Conflict("referral code already in use".to_string());
        }
    }
    storage(e)
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn get_or_create(&self, new: NewAccount) -> Result<(Account, bool), LedgerError> {
        let inserted = sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (external_id, display_name, referral_code, referred_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING *"#,
        )
        .bind(&new.external_id)
        .bind(&new.display_name)
        .bind(&new.referral_code)
        .bind(&new.referred_by)
        .fetch_optional(&self.conn)
        .await
        .map_err(classify_insert_error)?;

        match inserted {
            Some(account) => Ok((account, true)),
            None => {
                // lost the creation race or already registered; the winner's
                // row is the answer either way
                let existing =
                    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE external_id = $1")
                        .bind(&new.external_id)
                        .fetch_one(&self.conn)
                        .await
                        .map_err(storage)?;
                Ok((existing, false))
            }
        }
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Account>, LedgerError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.conn)
            .await
            .map_err(storage)
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, LedgerError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.conn)
            .await
            .map_err(storage)
    }

    async fn apply_mutation<R, F>(
        &self,
        external_id: &str,
        mutation: F,
    ) -> Result<(Account, R), LedgerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Account) -> Result<R, LedgerError> + Send + 'static,
    {
        let mut tx = self.conn.begin().await.map_err(storage)?;

        // the row lock is what serializes concurrent mutations per account
        let row = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE external_id = $1 FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let mut account =
            row.ok_or_else(|| LedgerError::NotRegistered(external_id.to_string()))?;
        let value = mutation(&mut account)?;

        sqlx::query(
            r#"UPDATE accounts SET
                display_name = $1,
                balance = $2,
                referral_points = $3,
                last_mined = $4,
                last_spun = $5,
                last_spin_reward = $6,
                quests_completed = $7,
                wallet_address = $8
            WHERE external_id = $9"#,
        )
        .bind(&account.display_name)
        .bind(account.balance)
        .bind(account.referral_points)
        .bind(account.last_mined)
        .bind(account.last_spun)
        .bind(account.last_spin_reward)
        .bind(&account.quests_completed)
        .bind(&account.wallet_address)
        .bind(external_id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        Ok((account, value))
    }

    async fn top_by_balance(&self, limit: i64) -> Result<Vec<Account>, LedgerError> {
        sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts ORDER BY balance DESC, created_at ASC, id ASC LIMIT $1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.conn)
        .await
        .map_err(storage)
    }
}
