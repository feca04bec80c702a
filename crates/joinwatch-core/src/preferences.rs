//! Per-identity announcement preferences.
//!
//! The durable copy of every [`Preference`] lives in a [`PreferenceStore`].
//! The [`PreferenceCache`] mirrors it in memory so the reconciliation loop
//! can filter joins without touching the store on every tick.
//!
//! # Consistency
//!
//! The cache is the only mutable state shared between the reconciliation
//! task and the command surface. Reads are synchronous and take a short
//! shared lock that is never held across an `.await`; mutations are
//! serialized by a separate async writer lock and always hit the store first. The
//! cache is updated only after the store write succeeded, so a failed write
//! leaves no preference visible in memory that the store does not hold.
//!
//! Loading is fail-open: if the store cannot be read at startup the cache
//! stays empty and everyone is announced.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use joinwatch_types::{Identity, Preference};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors reported by a [`PreferenceStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading records failed.
    #[error("preference read failed: {0}")]
    Read(String),

    /// Writing a record failed.
    #[error("preference write failed: {0}")]
    Write(String),
}

/// Errors returned by preference commands.
#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    /// The identity has no record in the store. Unknown identities are
    /// never registered implicitly.
    #[error("{identity} is not registered")]
    NotRegistered {
        /// The identity the command referred to.
        identity: Identity,
    },

    /// The store rejected the write; the cache was left unchanged.
    #[error("could not persist preference: {source}")]
    Persist {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Durable keyed storage of preference records.
pub trait PreferenceStore: Send + Sync {
    /// Read every record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the store is unreachable.
    fn load_all(&self) -> impl Future<Output = Result<Vec<Preference>, StoreError>> + Send;

    /// Set the `silent` flag of an existing record, leaving every other
    /// field untouched.
    ///
    /// Returns `Ok(None)` when no record exists for `identity`; the store
    /// must not create one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the write failed.
    fn write_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> impl Future<Output = Result<Option<Preference>, StoreError>> + Send;

    /// Provision a record for `identity` (out-of-band registration).
    ///
    /// Registering an identity that already exists returns the existing
    /// record unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the write failed.
    fn register(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> impl Future<Output = Result<Preference, StoreError>> + Send;
}

/// In-memory mirror of a [`PreferenceStore`].
pub struct PreferenceCache<P> {
    store: P,
    entries: RwLock<BTreeMap<Identity, Preference>>,
    writes: Mutex<()>,
}

impl<P: PreferenceStore> PreferenceCache<P> {
    /// Create an empty cache in front of `store`. Call
    /// [`load_all`](Self::load_all) once before serving reads.
    pub fn new(store: P) -> Self {
        Self {
            store,
            entries: RwLock::new(BTreeMap::new()),
            writes: Mutex::new(()),
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &P {
        &self.store
    }

    /// Bulk-load every record from the store, replacing the cache contents.
    ///
    /// Returns the number of records loaded. A read failure is logged and
    /// leaves the cache as it was (empty at startup).
    pub async fn load_all(&self) -> usize {
        match self.store.load_all().await {
            Ok(records) => {
                let loaded: BTreeMap<Identity, Preference> = records
                    .into_iter()
                    .map(|pref| (pref.identity.clone(), pref))
                    .collect();
                let count = loaded.len();
                *self.write_entries() = loaded;
                info!(count, "preferences loaded");
                count
            }
            Err(e) => {
                warn!(error = %e, "failed to load preferences, announcing everyone");
                0
            }
        }
    }

    /// Whether join notifications for `identity` are suppressed.
    ///
    /// Identities without a record are visible.
    pub fn is_silent(&self, identity: &Identity) -> bool {
        self.read_entries()
            .get(identity)
            .is_some_and(|pref| pref.silent)
    }

    /// Keep only the identities that are not silent, preserving order.
    ///
    /// Takes the read lock once for the whole batch.
    pub fn visible<'a, I>(&self, identities: I) -> Vec<Identity>
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        let entries = self.read_entries();
        identities
            .into_iter()
            .filter(|id| !entries.get(*id).is_some_and(|pref| pref.silent))
            .cloned()
            .collect()
    }

    /// The cached record for `identity`, if any.
    pub fn get(&self, identity: &Identity) -> Option<Preference> {
        self.read_entries().get(identity).cloned()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    // A poisoned lock still holds a consistent map: every write is a single
    // replace or insert.
    fn read_entries(&self) -> RwLockReadGuard<'_, BTreeMap<Identity, Preference>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, BTreeMap<Identity, Preference>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the `silent` flag for a registered identity.
    ///
    /// The store is written first; the cache is updated only on success.
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError::NotRegistered`] if the store has no record
    /// for `identity`, or [`PreferenceError::Persist`] if the write failed.
    /// In both cases the cache is unchanged.
    pub async fn set_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> Result<Preference, PreferenceError> {
        let _writer = self.writes.lock().await;

        let Some(updated) = self.store.write_silent(identity, silent).await? else {
            debug!(identity = %identity, "preference change for unregistered identity");
            return Err(PreferenceError::NotRegistered {
                identity: identity.clone(),
            });
        };

        self.write_entries()
            .insert(updated.identity.clone(), updated.clone());
        info!(identity = %identity, silent, "preference updated");
        Ok(updated)
    }

    /// Register `identity` in the store and mirror the record.
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError::Persist`] if the store write failed.
    pub async fn register(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> Result<Preference, PreferenceError> {
        let _writer = self.writes.lock().await;
        let record = self.store.register(identity, display_nick).await?;
        self.write_entries()
            .insert(record.identity.clone(), record.clone());
        info!(identity = %identity, "identity registered");
        Ok(record)
    }
}

/// A [`PreferenceStore`] held entirely in memory.
///
/// Records do not survive a restart. Used when no database is configured,
/// and as the store in tests.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    records: Mutex<BTreeMap<Identity, Preference>>,
}

impl MemoryPreferenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = Preference>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|pref| (pref.identity.clone(), pref))
                    .collect(),
            ),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    async fn load_all(&self) -> Result<Vec<Preference>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn write_silent(
        &self,
        identity: &Identity,
        silent: bool,
    ) -> Result<Option<Preference>, StoreError> {
        let mut records = self.records.lock().await;
        Ok(records.get_mut(identity).map(|pref| {
            pref.silent = silent;
            pref.clone()
        }))
    }

    async fn register(
        &self,
        identity: &Identity,
        display_nick: Option<&str>,
    ) -> Result<Preference, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.entry(identity.clone()).or_insert_with(|| {
            Preference::visible(identity.clone(), display_nick.map(ToOwned::to_owned))
        });
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn registered(name: &str, silent: bool) -> Preference {
        Preference {
            identity: Identity::from(name),
            silent,
            display_nick: Some(format!("{name}-nick")),
        }
    }

    /// A store whose reads and writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryPreferenceStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl PreferenceStore for FlakyStore {
        async fn load_all(&self) -> Result<Vec<Preference>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Read(String::from("connection refused")));
            }
            self.inner.load_all().await
        }

        async fn write_silent(
            &self,
            identity: &Identity,
            silent: bool,
        ) -> Result<Option<Preference>, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Write(String::from("disk full")));
            }
            self.inner.write_silent(identity, silent).await
        }

        async fn register(
            &self,
            identity: &Identity,
            display_nick: Option<&str>,
        ) -> Result<Preference, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Write(String::from("disk full")));
            }
            self.inner.register(identity, display_nick).await
        }
    }

    /// A store whose `write_silent` waits until released.
    struct GatedStore {
        inner: MemoryPreferenceStore,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl PreferenceStore for GatedStore {
        async fn load_all(&self) -> Result<Vec<Preference>, StoreError> {
            self.inner.load_all().await
        }

        async fn write_silent(
            &self,
            identity: &Identity,
            silent: bool,
        ) -> Result<Option<Preference>, StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.write_silent(identity, silent).await
        }

        async fn register(
            &self,
            identity: &Identity,
            display_nick: Option<&str>,
        ) -> Result<Preference, StoreError> {
            self.inner.register(identity, display_nick).await
        }
    }

    #[tokio::test]
    async fn reads_do_not_wait_for_a_pending_write() {
        use std::sync::Arc;

        let cache = Arc::new(PreferenceCache::new(GatedStore {
            inner: MemoryPreferenceStore::with_records([registered("A", false)]),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        }));
        cache.load_all().await;

        let writer = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.set_silent(&Identity::from("A"), true).await })
        };
        cache.store.entered.notified().await;

        // The write is parked inside the store; plain reads still answer.
        assert!(!cache.is_silent(&Identity::from("A")));
        assert_eq!(cache.visible(&[Identity::from("A")]), vec![Identity::from("A")]);

        cache.store.release.notify_one();
        assert!(matches!(writer.await, Ok(Ok(_))));
        assert!(cache.is_silent(&Identity::from("A")));
    }

    #[tokio::test]
    async fn unknown_identity_is_visible() {
        let cache = PreferenceCache::new(MemoryPreferenceStore::new());
        cache.load_all().await;
        assert!(!cache.is_silent(&Identity::from("nobody")));
    }

    #[tokio::test]
    async fn load_all_mirrors_store() {
        let store = MemoryPreferenceStore::with_records([
            registered("A", true),
            registered("B", false),
        ]);
        let cache = PreferenceCache::new(store);
        assert_eq!(cache.load_all().await, 2);
        assert!(cache.is_silent(&Identity::from("A")));
        assert!(!cache.is_silent(&Identity::from("B")));
    }

    #[tokio::test]
    async fn load_failure_fails_open() {
        let store = FlakyStore::default();
        store.fail_reads.store(true, Ordering::SeqCst);
        let cache = PreferenceCache::new(store);
        assert_eq!(cache.load_all().await, 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn set_silent_on_unregistered_identity_is_rejected() {
        let cache = PreferenceCache::new(MemoryPreferenceStore::new());
        cache.load_all().await;

        let result = cache.set_silent(&Identity::from("ghost"), true).await;
        assert!(matches!(result, Err(PreferenceError::NotRegistered { .. })));
        assert!(!cache.is_silent(&Identity::from("ghost")));
        assert!(cache.get(&Identity::from("ghost")).is_none());
    }

    #[tokio::test]
    async fn set_silent_updates_store_then_cache() {
        let cache = PreferenceCache::new(MemoryPreferenceStore::with_records([registered(
            "A", false,
        )]));
        cache.load_all().await;

        let updated = cache.set_silent(&Identity::from("A"), true).await;
        assert!(updated.is_ok());
        assert!(cache.is_silent(&Identity::from("A")));

        // The store holds the new flag and the nickname is preserved.
        let stored = cache.store.load_all().await.unwrap_or_default();
        assert_eq!(stored, vec![Preference {
            identity: Identity::from("A"),
            silent: true,
            display_nick: Some(String::from("A-nick")),
        }]);
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_unchanged() {
        let store = FlakyStore {
            inner: MemoryPreferenceStore::with_records([registered("A", false)]),
            ..FlakyStore::default()
        };
        let cache = PreferenceCache::new(store);
        cache.load_all().await;
        cache.store.fail_writes.store(true, Ordering::SeqCst);

        let result = cache.set_silent(&Identity::from("A"), true).await;
        assert!(matches!(result, Err(PreferenceError::Persist { .. })));
        assert!(!cache.is_silent(&Identity::from("A")));
    }

    #[tokio::test]
    async fn set_silent_reaches_identities_missing_from_a_failed_load() {
        let store = FlakyStore {
            inner: MemoryPreferenceStore::with_records([registered("A", false)]),
            ..FlakyStore::default()
        };
        store.fail_reads.store(true, Ordering::SeqCst);
        let cache = PreferenceCache::new(store);
        cache.load_all().await;

        // The store, not the cache, decides whether the identity exists.
        let result = cache.set_silent(&Identity::from("A"), true).await;
        assert!(result.is_ok());
        assert!(cache.is_silent(&Identity::from("A")));
    }

    #[tokio::test]
    async fn visible_filters_silent_identities() {
        let cache = PreferenceCache::new(MemoryPreferenceStore::with_records([
            registered("A", true),
            registered("B", false),
        ]));
        cache.load_all().await;

        let ids = [Identity::from("A"), Identity::from("B"), Identity::from("C")];
        let visible = cache.visible(&ids);
        assert_eq!(visible, vec![Identity::from("B"), Identity::from("C")]);
    }

    #[tokio::test]
    async fn register_is_idempotent_and_preserves_existing_flag() {
        let cache = PreferenceCache::new(MemoryPreferenceStore::with_records([registered(
            "A", true,
        )]));
        cache.load_all().await;

        let again = cache.register(&Identity::from("A"), Some("other")).await;
        assert!(again.is_ok_and(|pref| pref.silent && pref.display_nick.as_deref() == Some("A-nick")));

        let fresh = cache.register(&Identity::from("B"), None).await;
        assert!(fresh.is_ok_and(|pref| !pref.silent));
        assert_eq!(cache.len(), 2);
    }
}
