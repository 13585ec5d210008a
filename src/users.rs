//! Local user directory.
//!
//! User and session management live in an external identity service; the
//! core only needs roles, names, and delivery addresses. That service syncs
//! into this read-mostly table via [`UserDirectory::sync_user`] — everything
//! else here is lookups.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::policy::Role;
use crate::storage::now_ts;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub synced_at: i64,
}

impl UserRow {
    pub fn role(&self) -> Role {
        Role::from_str(&self.role)
    }
}

#[derive(Clone)]
pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert one user record from the identity service.
    pub async fn sync_user(
        &self,
        id: &str,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        role: Role,
    ) -> Result<UserRow> {
        sqlx::query(
            "INSERT INTO users (id, name, email, phone, role, synced_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name, email = excluded.email,
               phone = excluded.phone, role = excluded.role,
               synced_at = excluded.synced_at",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(role.as_str())
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("user not found after sync"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// All users holding any of the given roles.
    pub async fn list_by_roles(&self, roles: &[Role]) -> Result<Vec<UserRow>> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|u| roles.contains(&u.role()))
            .collect())
    }

    /// First user whose name contains `fragment`, case-insensitively.
    ///
    /// Ordering by name makes "first found" deterministic. Substring matching
    /// can pick the wrong user for overlapping names ("Ann" vs "Anna") — kept
    /// as the platform's mention semantics.
    pub async fn find_by_name_fragment(&self, fragment: &str) -> Result<Option<UserRow>> {
        if fragment.is_empty() {
            return Ok(None);
        }
        let needle = fragment.to_lowercase();
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .find(|u| u.name.to_lowercase().contains(&needle)))
    }
}
