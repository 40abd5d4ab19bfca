//! PostgreSQL storage backend
//!
//! Accounts and sessions are stored in two tables (see `migrations/`).
//! Session rotation runs as a conditional delete inside a transaction, so two
//! concurrent rotations of the same token cannot both succeed.

use super::{AccountRepository, NewAccount, SessionRecord, SessionRepository};
use crate::{Account, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

const EMAIL_CONSTRAINT: &str = "accounts_email_key";
const DISPLAY_NAME_CONSTRAINT: &str = "accounts_display_name_folded_key";

/// PostgreSQL account and session store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and build a pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Apply embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))
    }
}

/// Account row from database
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    display_name: Option<String>,
    password_hash: String,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            avatar_url: row.avatar_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Session row from database
#[derive(Debug, FromRow)]
struct SessionRow {
    account_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            account_id: row.account_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// Translate unique-constraint violations into conflict errors
fn map_write_error(err: sqlx::Error, context: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some(DISPLAY_NAME_CONSTRAINT) => return StoreError::DisplayNameTaken,
            Some(EMAIL_CONSTRAINT) => return StoreError::EmailTaken,
            _ => {}
        }
    }
    StoreError::DatabaseError(format!("{context}: {err}"))
}

const ACCOUNT_COLUMNS: &str =
    "id, email, display_name, password_hash, avatar_url, created_at, updated_at";

#[async_trait]
impl AccountRepository for PostgresStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        let query = format!(
            r#"
            INSERT INTO accounts (id, email, display_name, password_hash, avatar_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row: AccountRow = sqlx::query_as(&query)
            .bind(Uuid::new_v4())
            .bind(&account.email)
            .bind(&account.display_name)
            .bind(&account.password_hash)
            .bind(&account.avatar_url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to create account"))?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to fetch account: {e}")))?;

        Ok(row.map(Account::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to fetch account: {e}")))?;

        Ok(row.map(Account::from))
    }

    async fn find_by_display_name(&self, display_name: &str) -> Result<Option<Account>> {
        // Equality on a bound parameter: no LIKE/regex metacharacters are interpreted.
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(display_name) = lower($1) LIMIT 1"
        );

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(display_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to fetch account: {e}")))?;

        Ok(row.map(Account::from))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Account> {
        let query = format!(
            r#"
            UPDATE accounts SET
                display_name = COALESCE($2, display_name),
                avatar_url = COALESCE($3, avatar_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(id)
            .bind(display_name)
            .bind(avatar_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, "Failed to update account"))?;

        row.map(Account::from).ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl SessionRepository for PostgresStore {
    async fn add(&self, record: SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account_sessions (account_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, token_hash) DO NOTHING
            "#,
        )
        .bind(record.account_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to store session: {e}")))?;

        Ok(())
    }

    async fn contains(&self, account_id: Uuid, token_hash: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM account_sessions WHERE account_id = $1 AND token_hash = $2",
        )
        .bind(account_id)
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to check session: {e}")))?;

        Ok(count > 0)
    }

    async fn remove(&self, account_id: Uuid, token_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM account_sessions WHERE account_id = $1 AND token_hash = $2",
        )
        .bind(account_id)
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to remove session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        account_id: Uuid,
        old_hash: &str,
        replacement: SessionRecord,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM account_sessions WHERE account_id = $1 AND token_hash = $2",
        )
        .bind(account_id)
        .bind(old_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to consume session: {e}")))?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO account_sessions (account_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to store session: {e}")))?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_all(&self, account_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM account_sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to revoke sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn list(&self, account_id: Uuid) -> Result<Vec<SessionRecord>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT account_id, token_hash, expires_at, created_at
            FROM account_sessions
            WHERE account_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to list sessions: {e}")))?;

        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM account_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to purge sessions: {e}")))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> PostgresStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PostgresStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn new_account(tag: &str, name: &str) -> NewAccount {
        NewAccount {
            email: format!("{tag}-{}@x.com", Uuid::new_v4()),
            display_name: Some(format!("{name} {}", Uuid::new_v4())),
            password_hash: "hash".to_string(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_display_name_lookup_is_case_insensitive() {
        let store = test_store().await;
        let created = store.create_account(new_account("pg", "Alice")).await.unwrap();
        let name = created.display_name.clone().unwrap();

        let found = store
            .find_by_display_name(&name.to_uppercase())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        let clash = NewAccount {
            email: format!("other-{}@x.com", Uuid::new_v4()),
            display_name: Some(name.to_lowercase()),
            password_hash: "hash".to_string(),
            avatar_url: None,
        };
        assert!(matches!(
            store.create_account(clash).await,
            Err(StoreError::DisplayNameTaken)
        ));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_rotate_is_single_use() {
        let store = test_store().await;
        let account = store.create_account(new_account("rot", "Rot")).await.unwrap();
        let expires = Utc::now() + Duration::days(1);

        store
            .add(SessionRecord::new(account.id, "old".into(), expires))
            .await
            .unwrap();

        let first = store
            .rotate(account.id, "old", SessionRecord::new(account.id, "new".into(), expires))
            .await
            .unwrap();
        let second = store
            .rotate(account.id, "old", SessionRecord::new(account.id, "newer".into(), expires))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert!(store.contains(account.id, "new").await.unwrap());
        assert!(!store.contains(account.id, "newer").await.unwrap());
    }
}
