//! Presence reconciliation engine.
//!
//! One reconciliation tick runs these steps:
//!
//! 1. **Fetch** -- ask the [`StatusSource`] for the current snapshot. On a
//!    soft failure the tick ends here: no events, and the previous snapshot
//!    is kept exactly as it was.
//! 2. **Diff** -- `joined = current \ previous`. Departures are tracked only
//!    by absence and never announced.
//! 3. **Filter** -- drop every joined identity the [`PreferenceCache`] marks
//!    silent. Identities without a record are announced.
//! 4. **Notify** -- deliver one [`JoinEvent`] per remaining identity. Each
//!    delivery is independent; a failure is logged and the batch continues.
//! 5. **Replace** -- the current snapshot becomes the previous snapshot
//!    (wholesale replacement) and is published to the [`PresenceView`].
//!
//! The engine owns its previous snapshot outright. The only state it shares
//! with other tasks is the preference cache.
//!
//! [`PresenceView`]: crate::presence::PresenceView

use std::sync::Arc;

use chrono::Utc;
use joinwatch_types::{JoinEvent, PresenceSnapshot};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::preferences::{PreferenceCache, PreferenceStore};
use crate::presence::PresencePublisher;
use crate::sink::{NotificationSink, NotifyError};
use crate::source::{FetchError, StatusSource};

/// Reasons the engine refuses to start.
///
/// Both are configuration errors: the loop must not run if join events
/// would have nowhere to go.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The chat transport never became usable.
    #[error("notification transport not ready: {0}")]
    NotReady(#[source] NotifyError),

    /// The announcement destination could not be resolved.
    #[error("announcement destination unresolved: {0}")]
    DestinationUnresolved(#[source] NotifyError),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The fetch failed; nothing changed.
    Skipped,
    /// The snapshot was reconciled.
    Reconciled(TickReport),
}

/// Counters for a reconciled tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Identities in the new snapshot.
    pub present: usize,
    /// Identities new since the previous snapshot.
    pub joined: usize,
    /// Joined identities withheld because they are silent.
    pub suppressed: usize,
    /// Join events delivered.
    pub delivered: usize,
    /// Join events whose delivery failed.
    pub failed: usize,
}

/// The reconciliation state machine.
///
/// Its single persisted field is the previous snapshot; everything else is
/// a collaborator handle.
pub struct ReconciliationEngine<S, N: NotificationSink, P> {
    source: S,
    sink: N,
    destination: N::Destination,
    preferences: Arc<PreferenceCache<P>>,
    publisher: PresencePublisher,
    previous: PresenceSnapshot,
    consecutive_failures: u32,
    failure_warn_threshold: u32,
}

impl<S, N, P> ReconciliationEngine<S, N, P>
where
    S: StatusSource,
    N: NotificationSink,
    P: PreferenceStore,
{
    /// Wait for the sink to become ready, resolve the destination, and
    /// build an engine whose previous snapshot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] if the transport is not ready or the
    /// destination cannot be resolved. No tick runs in that case.
    pub async fn start(
        source: S,
        sink: N,
        preferences: Arc<PreferenceCache<P>>,
        publisher: PresencePublisher,
        config: &EngineConfig,
    ) -> Result<Self, StartError> {
        sink.ready().await.map_err(StartError::NotReady)?;
        let destination = sink
            .resolve_destination()
            .await
            .map_err(StartError::DestinationUnresolved)?;

        info!(source = source.name(), "reconciliation engine ready");

        Ok(Self {
            source,
            sink,
            destination,
            preferences,
            publisher,
            previous: PresenceSnapshot::empty(),
            consecutive_failures: 0,
            failure_warn_threshold: config.failure_warn_threshold,
        })
    }

    /// Run one reconciliation tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let snapshot = match self.source.fetch_presence().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.record_fetch_failure(&e);
                return TickOutcome::Skipped;
            }
        };
        let observed_at = Utc::now();

        if self.consecutive_failures > 0 {
            info!(
                failures = self.consecutive_failures,
                "status source recovered"
            );
            self.consecutive_failures = 0;
        }

        let joined: Vec<_> = snapshot.joined_since(&self.previous).collect();
        let joined_count = joined.len();
        let visible = self.preferences.visible(joined);

        let mut report = TickReport {
            present: snapshot.len(),
            joined: joined_count,
            suppressed: joined_count.saturating_sub(visible.len()),
            ..TickReport::default()
        };

        for identity in visible {
            let event = JoinEvent::now(identity);
            match self.sink.deliver(&self.destination, &event).await {
                Ok(()) => {
                    report.delivered = report.delivered.saturating_add(1);
                    info!(
                        identity = %event.identity,
                        event_id = %event.id,
                        "join announced"
                    );
                }
                Err(e) => {
                    report.failed = report.failed.saturating_add(1);
                    warn!(
                        identity = %event.identity,
                        event_id = %event.id,
                        error = %e,
                        "failed to announce join"
                    );
                }
            }
        }

        self.publisher.publish(&snapshot, observed_at);
        self.previous = snapshot;

        debug!(
            present = report.present,
            joined = report.joined,
            suppressed = report.suppressed,
            delivered = report.delivered,
            failed = report.failed,
            "tick reconciled"
        );

        TickOutcome::Reconciled(report)
    }

    /// The snapshot the next tick will diff against.
    pub const fn previous_snapshot(&self) -> &PresenceSnapshot {
        &self.previous
    }

    /// Consecutive failed fetches since the last successful one.
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn record_fetch_failure(&mut self, error: &FetchError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.failure_warn_threshold {
            warn!(
                source = self.source.name(),
                failures = self.consecutive_failures,
                error = %error,
                "status fetch keeps failing, tick skipped"
            );
        } else {
            debug!(
                source = self.source.name(),
                failures = self.consecutive_failures,
                error = %error,
                "status fetch failed, tick skipped"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use joinwatch_types::{Identity, Preference};
    use tokio::sync::Mutex;

    use super::*;
    use crate::preferences::MemoryPreferenceStore;
    use crate::presence::{PresenceView, presence_channel};

    pub(crate) fn snap(names: &[&str]) -> PresenceSnapshot {
        names.iter().map(|n| Identity::from(*n)).collect()
    }

    /// Replays a scripted sequence of fetch results; empty script means
    /// the service is down.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pub(crate) script: StdMutex<VecDeque<Result<PresenceSnapshot, FetchError>>>,
        pub(crate) fetches: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<PresenceSnapshot, FetchError>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl StatusSource for ScriptedSource {
        async fn fetch_presence(&self) -> Result<PresenceSnapshot, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .ok()
                .and_then(|mut script| script.pop_front())
                .unwrap_or_else(|| Err(FetchError::Status { status: 503 }))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    pub(crate) fn down() -> Result<PresenceSnapshot, FetchError> {
        Err(FetchError::Transport(String::from("connection reset")))
    }

    /// Records delivered events; can be told to fail for some identities
    /// or to refuse startup.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) delivered: Arc<Mutex<Vec<JoinEvent>>>,
        pub(crate) fail_for: BTreeSet<Identity>,
        pub(crate) unresolvable: bool,
        pub(crate) not_ready: bool,
    }

    impl RecordingSink {
        pub(crate) async fn names(&self) -> Vec<String> {
            let mut names: Vec<String> = self
                .delivered
                .lock()
                .await
                .iter()
                .map(|e| e.identity.to_string())
                .collect();
            names.sort();
            names
        }
    }

    impl NotificationSink for RecordingSink {
        type Destination = String;

        async fn ready(&self) -> Result<(), NotifyError> {
            if self.not_ready {
                return Err(NotifyError::NotReady(String::from("401 Unauthorized")));
            }
            Ok(())
        }

        async fn resolve_destination(&self) -> Result<String, NotifyError> {
            if self.unresolvable {
                return Err(NotifyError::Unresolved {
                    destination: String::from("0"),
                    reason: String::from("unknown channel"),
                });
            }
            Ok(String::from("announcements"))
        }

        async fn deliver(&self, _destination: &String, event: &JoinEvent) -> Result<(), NotifyError> {
            if self.fail_for.contains(&event.identity) {
                return Err(NotifyError::Delivery(String::from("rate limited")));
            }
            self.delivered.lock().await.push(event.clone());
            Ok(())
        }
    }

    pub(crate) type TestEngine =
        ReconciliationEngine<ScriptedSource, RecordingSink, MemoryPreferenceStore>;

    pub(crate) async fn engine_with(
        script: Vec<Result<PresenceSnapshot, FetchError>>,
        sink: RecordingSink,
        preferences: Vec<Preference>,
    ) -> (TestEngine, PresenceView<MemoryPreferenceStore>) {
        let cache = Arc::new(PreferenceCache::new(MemoryPreferenceStore::with_records(
            preferences,
        )));
        cache.load_all().await;
        let (publisher, view) = presence_channel(Arc::clone(&cache));
        let engine = ReconciliationEngine::start(
            ScriptedSource::new(script),
            sink,
            cache,
            publisher,
            &EngineConfig::default(),
        )
        .await;
        match engine {
            Ok(engine) => (engine, view),
            Err(e) => panic!("engine failed to start: {e}"),
        }
    }

    fn reconciled(outcome: TickOutcome) -> TickReport {
        match outcome {
            TickOutcome::Reconciled(report) => report,
            TickOutcome::Skipped => panic!("tick was skipped"),
        }
    }

    #[tokio::test]
    async fn first_tick_announces_everyone_present() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(vec![Ok(snap(&["A", "B"]))], sink.clone(), vec![]).await;

        let report = reconciled(engine.tick().await);
        assert_eq!(report.joined, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(sink.names().await, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn unchanged_snapshot_emits_nothing_the_second_time() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(
            vec![Ok(snap(&["A", "B"])), Ok(snap(&["A", "B"]))],
            sink.clone(),
            vec![],
        )
        .await;

        engine.tick().await;
        let second = reconciled(engine.tick().await);
        assert_eq!(second.joined, 0);
        assert_eq!(sink.delivered.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn silent_identity_is_not_announced() {
        let sink = RecordingSink::default();
        let silent_a = Preference {
            identity: Identity::from("A"),
            silent: true,
            display_nick: None,
        };
        let (mut engine, _view) =
            engine_with(vec![Ok(snap(&["A", "B"]))], sink.clone(), vec![silent_a]).await;

        let report = reconciled(engine.tick().await);
        assert_eq!(report.suppressed, 1);
        assert_eq!(sink.names().await, vec!["B"]);
        // Silent identities are still part of the tracked snapshot.
        assert!(engine.previous_snapshot().contains(&Identity::from("A")));
    }

    #[tokio::test]
    async fn fetch_failure_preserves_previous_snapshot() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(
            vec![Ok(snap(&["A"])), down(), Ok(snap(&["A", "C"]))],
            sink.clone(),
            vec![],
        )
        .await;

        engine.tick().await;
        assert_eq!(engine.tick().await, TickOutcome::Skipped);
        assert_eq!(engine.previous_snapshot(), &snap(&["A"]));
        assert_eq!(engine.consecutive_failures(), 1);

        let report = reconciled(engine.tick().await);
        assert_eq!(report.delivered, 1);
        assert_eq!(sink.names().await, vec!["A", "C"]);
        assert_eq!(engine.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn failure_is_not_a_mass_departure_then_rejoin() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(
            vec![Ok(snap(&["A", "B"])), down(), down(), Ok(snap(&["A", "B"]))],
            sink.clone(),
            vec![],
        )
        .await;

        for _ in 0..4 {
            engine.tick().await;
        }
        assert_eq!(sink.delivered.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn genuine_empty_snapshot_is_accepted() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(
            vec![Ok(snap(&["A"])), Ok(snap(&[])), Ok(snap(&["A"]))],
            sink.clone(),
            vec![],
        )
        .await;

        engine.tick().await;
        let empty = reconciled(engine.tick().await);
        assert_eq!(empty.present, 0);
        assert!(engine.previous_snapshot().is_empty());

        // A real departure followed by a return is a new join.
        let back = reconciled(engine.tick().await);
        assert_eq!(back.delivered, 1);
    }

    #[tokio::test]
    async fn set_silent_takes_effect_on_next_tick() {
        let sink = RecordingSink::default();
        let registered = Preference::visible(Identity::from("A"), None);
        let (mut engine, view) = engine_with(
            vec![Ok(snap(&[])), Ok(snap(&["A"]))],
            sink.clone(),
            vec![registered],
        )
        .await;

        engine.tick().await;
        let result = view
            .preferences()
            .set_silent(&Identity::from("A"), true)
            .await;
        assert!(result.is_ok());

        let report = reconciled(engine.tick().await);
        assert_eq!(report.joined, 1);
        assert_eq!(report.suppressed, 1);
        assert!(sink.delivered.lock().await.is_empty());
    }

    #[tokio::test]
    async fn departure_emits_nothing() {
        let sink = RecordingSink::default();
        let (mut engine, _view) = engine_with(
            vec![Ok(snap(&["A", "B"])), Ok(snap(&["B"]))],
            sink.clone(),
            vec![],
        )
        .await;

        engine.tick().await;
        let report = reconciled(engine.tick().await);
        assert_eq!(report.joined, 0);
        assert_eq!(report.delivered, 0);
        assert_eq!(engine.previous_snapshot(), &snap(&["B"]));
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_stop_the_batch() {
        let sink = RecordingSink {
            fail_for: [Identity::from("B")].into_iter().collect(),
            ..RecordingSink::default()
        };
        let (mut engine, _view) =
            engine_with(vec![Ok(snap(&["A", "B", "C"]))], sink.clone(), vec![]).await;

        let report = reconciled(engine.tick().await);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.names().await, vec!["A", "C"]);
        // The snapshot still advances; B is not retried.
        assert!(engine.previous_snapshot().contains(&Identity::from("B")));
    }

    #[tokio::test]
    async fn successful_tick_is_published_to_the_view() {
        let sink = RecordingSink::default();
        let (mut engine, view) =
            engine_with(vec![Ok(snap(&["A"])), down()], sink, vec![]).await;

        engine.tick().await;
        engine.tick().await;
        let visible = view.current_visible_presence();
        assert_eq!(visible.identities, vec![Identity::from("A")]);
        assert!(visible.observed_at.is_some());
    }

    #[tokio::test]
    async fn unresolvable_destination_refuses_to_start() {
        let cache = Arc::new(PreferenceCache::new(MemoryPreferenceStore::new()));
        let (publisher, _view) = presence_channel(Arc::clone(&cache));
        let sink = RecordingSink {
            unresolvable: true,
            ..RecordingSink::default()
        };
        let result = ReconciliationEngine::start(
            ScriptedSource::new(vec![Ok(snap(&["A"]))]),
            sink,
            cache,
            publisher,
            &EngineConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(StartError::DestinationUnresolved(_))));
    }

    #[tokio::test]
    async fn unready_transport_refuses_to_start() {
        let cache = Arc::new(PreferenceCache::new(MemoryPreferenceStore::new()));
        let (publisher, _view) = presence_channel(Arc::clone(&cache));
        let sink = RecordingSink {
            not_ready: true,
            ..RecordingSink::default()
        };
        let result = ReconciliationEngine::start(
            ScriptedSource::new(vec![]),
            sink,
            cache,
            publisher,
            &EngineConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(StartError::NotReady(_))));
    }
}
