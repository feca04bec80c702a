//! Preference store selection.
//!
//! Uses enum dispatch so the engine, cache and API can stay generic over a
//! single concrete store type whichever backend is configured.

use joinwatch_core::preferences::{MemoryPreferenceStore, PreferenceStore, StoreError};
use joinwatch_db::PgPreferenceStore;
use joinwatch_types::{Identity, Preference};

/// The preference store in use.
pub enum Store {
    /// Durable store in `PostgreSQL`.
    Postgres(PgPreferenceStore),
    /// Process-local store; preferences are lost on restart.
    Memory(MemoryPreferenceStore),
}

impl Store {
    /// Human-readable name for logging.
    pub const fn name(&self) -> &str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

impl PreferenceStore for Store {
    async fn load_all(&self) -> Result<Vec<Preference>, StoreError> {
        match self {
            Self::Postgres(store) => store.load_all().await,
            Self::Memory(store) => store.load_all().await,
        }
    }

    async fn write_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> Result<Option<Preference>, StoreError> {
        match self {
            Self::Postgres(store) => store.write_silent(identity, silent).await,
            Self::Memory(store) => store.write_silent(identity, silent).await,
        }
    }

    async fn register(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> Result<Preference, StoreError> {
        match self {
            Self::Postgres(store) => store.register(identity, display_nick).await,
            Self::Memory(store) => store.register(identity, display_nick).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_variant_dispatches() {
        let store = Store::Memory(MemoryPreferenceStore::new());
        assert_eq!(store.name(), "memory");

        let id = Identity::from("Steve");
        assert!(store.write_silent(&id, true).await.unwrap().is_none());
        store.register(&id, None).await.unwrap();
        let updated = store.write_silent(&id, true).await.unwrap().unwrap();
        assert!(updated.silent);
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
