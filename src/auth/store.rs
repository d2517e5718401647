//! Credential store collaborator contract and its adapters.
//!
//! The Postgres adapter backs the running service; the in-memory adapter
//! backs tests and exhibits the same optimistic-concurrency semantics.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool, Row};
use uuid::Uuid;

use crate::auth::lockout::{AccountSecurity, AccountStatus};
use crate::auth::responses::Role;
use crate::auth::{AuthError, AuthResult};

/// One account's credential row, including the mutable security state.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub security: AccountSecurity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCredential {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

/// Lookup and persistence contract for account credentials.
///
/// `save` persists the security state under an optimistic version check: a
/// stale `security.version` yields [`AuthError::Conflict`] instead of a
/// silent overwrite, and a successful save returns the record with the
/// bumped version.
#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<CredentialRecord>>;
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<CredentialRecord>>;
    async fn insert(&self, new: NewCredential) -> AuthResult<CredentialRecord>;
    async fn save(&self, record: &CredentialRecord) -> AuthResult<CredentialRecord>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<CredentialRecord>> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, role, status, failed_attempts, locked_until, version, created_at, updated_at
             FROM account_credentials WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<CredentialRecord>> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, role, status, failed_attempts, locked_until, version, created_at, updated_at
             FROM account_credentials WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    async fn insert(&self, new: NewCredential) -> AuthResult<CredentialRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let security = AccountSecurity::new();

        let result = sqlx::query(
            "INSERT INTO account_credentials
             (id, email, name, password_hash, role, status, failed_attempts, locked_until, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)",
        )
        .bind(id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(security.status.as_str())
        .bind(security.failed_attempts)
        .bind(security.locked_until)
        .bind(security.version)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(CredentialRecord {
                id,
                email: new.email,
                name: new.name,
                password_hash: new.password_hash,
                role: new.role,
                security,
                created_at: now,
                updated_at: now,
            }),
            Err(err) if is_unique_violation(&err) => Err(AuthError::EmailTaken),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, record: &CredentialRecord) -> AuthResult<CredentialRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE account_credentials
             SET status = $1, failed_attempts = $2, locked_until = $3,
                 version = version + 1, updated_at = $4
             WHERE id = $5 AND version = $6",
        )
        .bind(record.security.status.as_str())
        .bind(record.security.failed_attempts)
        .bind(record.security.locked_until)
        .bind(now)
        .bind(record.id)
        .bind(record.security.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::Conflict);
        }

        let mut saved = record.clone();
        saved.security.version += 1;
        saved.updated_at = now;
        Ok(saved)
    }
}

fn record_from_row(row: sqlx::postgres::PgRow) -> AuthResult<CredentialRecord> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(CredentialRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from_str(&role),
        security: AccountSecurity {
            status: AccountStatus::from_str(&status),
            failed_attempts: row.try_get("failed_attempts")?,
            locked_until: row.try_get("locked_until")?,
            version: row.try_get("version")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == "23505").unwrap_or(false)
    )
}

/// In-memory credential store with the same conflict semantics as the
/// Postgres adapter. Backs the integration test suite.
#[derive(Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<HashMap<Uuid, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<Uuid, CredentialRecord>> {
        self.accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<CredentialRecord>> {
        let accounts = self.guard();
        Ok(accounts
            .values()
            .find(|record| record.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<CredentialRecord>> {
        Ok(self.guard().get(&id).cloned())
    }

    async fn insert(&self, new: NewCredential) -> AuthResult<CredentialRecord> {
        let mut accounts = self.guard();
        if accounts
            .values()
            .any(|record| record.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            role: new.role,
            security: AccountSecurity::new(),
            created_at: now,
            updated_at: now,
        };
        accounts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, record: &CredentialRecord) -> AuthResult<CredentialRecord> {
        let mut accounts = self.guard();
        let current = accounts.get(&record.id).ok_or(AuthError::Conflict)?;

        if current.security.version != record.security.version {
            return Err(AuthError::Conflict);
        }

        let mut saved = record.clone();
        saved.security.version += 1;
        saved.updated_at = Utc::now();
        accounts.insert(saved.id, saved.clone());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_credential(email: &str) -> NewCredential {
        NewCredential {
            email: email.into(),
            name: "Test Account".into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::Customer,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_emails() {
        let store = MemoryCredentialStore::new();
        store.insert(new_credential("a@example.com")).await.expect("first insert");

        let err = store
            .insert(new_credential("A@Example.com"))
            .await
            .expect_err("duplicate insert");
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn save_with_a_stale_version_conflicts() {
        let store = MemoryCredentialStore::new();
        let record = store.insert(new_credential("a@example.com")).await.expect("insert");

        let mut first = record.clone();
        first.security.failed_attempts = 1;
        let saved = store.save(&first).await.expect("first save");
        assert_eq!(saved.security.version, record.security.version + 1);

        // Second writer still holds the original version.
        let mut second = record.clone();
        second.security.failed_attempts = 1;
        let err = store.save(&second).await.expect_err("stale save");
        assert!(matches!(err, AuthError::Conflict));
    }

    #[tokio::test]
    async fn lookup_by_email_is_case_insensitive() {
        let store = MemoryCredentialStore::new();
        store.insert(new_credential("a@example.com")).await.expect("insert");
        let found = store.find_by_email("A@EXAMPLE.COM").await.expect("lookup");
        assert!(found.is_some());
    }
}
