//! The `preferences` table.
//!
//! Each row is one identity's announcement preference. The notifier flips
//! `silent` and never touches `display_nick`; rows are created only by
//! explicit registration, never as a side effect of a preference command.

use chrono::{DateTime, Utc};
use joinwatch_core::preferences::{PreferenceStore, StoreError};
use joinwatch_types::{Identity, Preference};
use sqlx::PgPool;

use crate::error::DbError;

/// Column list shared by every query that returns a full row.
const COLUMNS: &str = "identity, silent, display_nick, created_at, updated_at";

/// Operations on the `preferences` table.
#[derive(Debug, Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read every row, ordered by identity.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch_all(&self) -> Result<Vec<PreferenceRow>, DbError> {
        let rows = sqlx::query_as::<_, PreferenceRow>(&format!(
            "SELECT {COLUMNS} FROM preferences ORDER BY identity"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Read one row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch(&self, identity: &Identity) -> Result<Option<PreferenceRow>, DbError> {
        let row = sqlx::query_as::<_, PreferenceRow>(&format!(
            "SELECT {COLUMNS} FROM preferences WHERE identity = $1"
        ))
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Update `silent` on an existing row. Returns `None` if the row does
    /// not exist; no row is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn update_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> Result<Option<PreferenceRow>, DbError> {
        let row = sqlx::query_as::<_, PreferenceRow>(&format!(
            "UPDATE preferences SET silent = $2, updated_at = now() \
             WHERE identity = $1 RETURNING {COLUMNS}"
        ))
        .bind(identity.as_str())
        .bind(silent)
        .fetch_optional(&self.pool)
        .await?;

        tracing::debug!(
            identity = %identity,
            silent,
            found = row.is_some(),
            "Updated preference"
        );
        Ok(row)
    }

    /// Insert a visible row for `identity`, or return the existing row
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn insert_if_absent(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> Result<PreferenceRow, DbError> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, PreferenceRow>(&format!(
            "INSERT INTO preferences (identity, display_nick) VALUES ($1, $2) \
             ON CONFLICT (identity) DO UPDATE SET identity = EXCLUDED.identity \
             RETURNING {COLUMNS}"
        ))
        .bind(identity.as_str())
        .bind(display_nick)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(identity = %identity, "Registered identity");
        Ok(row)
    }
}

impl PreferenceStore for PgPreferenceStore {
    async fn load_all(&self) -> Result<Vec<Preference>, StoreError> {
        self.fetch_all()
            .await
            .map(|rows| rows.into_iter().map(PreferenceRow::into_preference).collect())
            .map_err(|e| StoreError::Read(e.to_string()))
    }

    async fn write_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> Result<Option<Preference>, StoreError> {
        self.update_silent(identity, silent)
            .await
            .map(|row| row.map(PreferenceRow::into_preference))
            .map_err(|e| StoreError::Write(e.to_string()))
    }

    async fn register(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> Result<Preference, StoreError> {
        self.insert_if_absent(identity, display_nick)
            .await
            .map(PreferenceRow::into_preference)
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

/// A row from the `preferences` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PreferenceRow {
    /// The participant identity (primary key).
    pub identity: String,
    /// Whether join announcements are suppressed.
    pub silent: bool,
    /// Chat-side nickname recorded at registration.
    pub display_nick: Option<String>,
    /// When the row was registered.
    pub created_at: DateTime<Utc>,
    /// When `silent` last changed.
    pub updated_at: DateTime<Utc>,
}

impl PreferenceRow {
    /// Convert to the shared [`Preference`] type.
    pub fn into_preference(self) -> Preference {
        Preference {
            identity: Identity::from(self.identity),
            silent: self.silent,
            display_nick: self.display_nick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_without_losing_nick() {
        let row = PreferenceRow {
            identity: String::from("Steve"),
            silent: true,
            display_nick: Some(String::from("steve_irl")),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let pref = row.into_preference();
        assert_eq!(pref.identity, Identity::from("Steve"));
        assert!(pref.silent);
        assert_eq!(pref.display_nick.as_deref(), Some("steve_irl"));
    }
}
