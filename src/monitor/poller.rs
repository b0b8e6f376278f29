//! The event monitor polling loop.
//!
//! `EventMonitor::monitor_events` subscribes to the event collector's latest
//! page, then long-polls the property collector, enriching and delivering
//! each page of new events until stopped or failed. The subscription is torn
//! down on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{BoxError, ConfigError, MonitorError, SessionError};
use crate::inventory::InventoryCache;
use crate::protocol::{MoRef, PropertyChange, UpdateSet};
use crate::session::{RemoteSession, WaitOptions};

use super::enricher::EventEnricher;
use super::event::Event;
use super::state::{MonitorId, MonitorState};
use super::subscription::Subscription;

/// Classified result of one wait call.
#[derive(Debug)]
enum WaitOutcome {
    /// The wait budget elapsed without changes.
    NoChange,
    Updates(UpdateSet),
    /// Receive timeout on a session that is still alive.
    RetryAlive,
    /// The wait ended because a stop was requested.
    Stopped,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscribes to server events and delivers them enriched, batch by batch.
///
/// One monitor runs at most one subscription. `stop` may be called from any
/// thread (or from inside the consumer) while `monitor_events` blocks.
pub struct EventMonitor {
    id: MonitorId,
    config: MonitorConfig,
    session: Arc<dyn RemoteSession>,
    enricher: EventEnricher,
    running: AtomicBool,
    started: AtomicBool,
    /// Property collector of the in-flight subscription, for cancellation.
    active_collector: Mutex<Option<MoRef>>,
    state: Mutex<MonitorState>,
}

impl std::fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EventMonitor {
    /// Create a monitor over `session`, enriching against `cache`.
    pub fn new(
        config: MonitorConfig,
        session: Arc<dyn RemoteSession>,
        cache: Arc<dyn InventoryCache>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: MonitorId::new(),
            config,
            session,
            enricher: EventEnricher::new(cache),
            running: AtomicBool::new(true),
            started: AtomicBool::new(false),
            active_collector: Mutex::new(None),
            state: Mutex::new(MonitorState::Idle),
        })
    }

    /// Identity used in log records.
    #[must_use]
    pub const fn id(&self) -> MonitorId {
        self.id
    }

    /// Configuration the monitor was built with.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *lock(&self.state)
    }

    /// False once `stop` has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_state(&self, state: MonitorState) {
        *lock(&self.state) = state;
    }

    /// Subscribe and deliver event batches to `on_batch` until stopped.
    ///
    /// Blocks the calling thread. Returns `Ok(())` after a stop request and
    /// an error if subscribing fails, the connection is lost, an event is
    /// malformed or `on_batch` fails. The filter is destroyed and the session
    /// disconnected before this returns, whatever the outcome.
    pub fn monitor_events<F, E>(&self, mut on_batch: F) -> Result<(), MonitorError>
    where
        F: FnMut(Vec<Event>) -> Result<(), E>,
        E: Into<BoxError>,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(MonitorError::AlreadyStarted);
        }

        let result = {
            let mut subscription = Subscription::begin(self.session.as_ref(), self.id);
            let result = self.run(&mut subscription, &mut on_batch);
            *lock(&self.active_collector) = None;
            subscription.teardown();
            result
        };

        match &result {
            Ok(()) => info!(monitor = %self.id, "event monitor stopped"),
            Err(e) => warn!(monitor = %self.id, error = %e, "event monitor terminated"),
        }
        self.set_state(MonitorState::TornDown);
        result
    }

    fn run<F, E>(&self, subscription: &mut Subscription<'_>, on_batch: &mut F) -> Result<(), MonitorError>
    where
        F: FnMut(Vec<Event>) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let filter = match subscription.install(&self.config) {
            Ok(filter) => filter,
            Err(e) => {
                self.set_state(MonitorState::Failed);
                return Err(MonitorError::Subscribe(e));
            }
        };
        self.set_state(MonitorState::Subscribed);

        let property_collector = subscription.property_collector().clone();
        *lock(&self.active_collector) = Some(property_collector.clone());

        let result = self.poll(&property_collector, &filter, on_batch);
        self.set_state(if result.is_ok() {
            MonitorState::Stopping
        } else {
            MonitorState::Failed
        });
        result
    }

    fn poll<F, E>(&self, property_collector: &MoRef, filter: &MoRef, on_batch: &mut F) -> Result<(), MonitorError>
    where
        F: FnMut(Vec<Event>) -> Result<(), E>,
        E: Into<BoxError>,
    {
        let options = WaitOptions::with_max_wait(self.config.max_wait);
        let mut version: Option<String> = None;

        if self.is_running() {
            self.set_state(MonitorState::Polling);
        }

        while self.is_running() {
            let result = self.session.wait_for_updates(property_collector, version.as_deref(), &options);
            let update_set = match self.classify(result)? {
                WaitOutcome::NoChange => continue,
                WaitOutcome::RetryAlive => {
                    debug!(monitor = %self.id, version = ?version, "receive timeout, session alive, retrying wait");
                    continue;
                }
                WaitOutcome::Stopped => break,
                WaitOutcome::Updates(set) => set,
            };

            version = Some(update_set.version.clone());

            let Some(update) = update_set.event_update_for(filter) else {
                continue;
            };

            let batch = self.enrich_changes(&update.change_set)?;
            debug!(monitor = %self.id, events = batch.len(), version = %update_set.version, "delivering event batch");
            on_batch(batch).map_err(|e| MonitorError::Consumer(e.into()))?;
        }

        Ok(())
    }

    fn classify(&self, result: Result<Option<UpdateSet>, SessionError>) -> Result<WaitOutcome, MonitorError> {
        match result {
            Ok(Some(set)) => Ok(WaitOutcome::Updates(set)),
            Ok(None) => Ok(WaitOutcome::NoChange),
            Err(_) if !self.is_running() => Ok(WaitOutcome::Stopped),
            Err(e) if e.is_receive_timeout() => {
                if self.session.is_alive() {
                    Ok(WaitOutcome::RetryAlive)
                } else {
                    debug!(monitor = %self.id, "connection lost");
                    Err(MonitorError::ConnectionLost(e))
                }
            }
            Err(e) => Err(MonitorError::Session(e)),
        }
    }

    /// Enrich every latest-page value in `changes`, in order.
    fn enrich_changes(&self, changes: &[PropertyChange]) -> Result<Vec<Event>, MonitorError> {
        let mut batch = Vec::new();
        for change in changes {
            let Some(val) = change.latest_page_value() else {
                continue;
            };
            match val {
                Value::Array(items) => {
                    batch.reserve(items.len());
                    for item in items {
                        batch.push(self.enricher.enrich(item.clone())?);
                    }
                }
                single => batch.push(self.enricher.enrich(single.clone())?),
            }
        }
        Ok(batch)
    }

    /// Request termination of `monitor_events`.
    ///
    /// No new wait is issued after this returns and an in-flight wait is
    /// cancelled. Events already being enriched are still delivered.
    /// Calling it again is a no-op.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!(monitor = %self.id, "event monitor stopping");

        {
            let mut state = lock(&self.state);
            if state.is_active() {
                *state = MonitorState::Stopping;
            }
        }

        let active = lock(&self.active_collector).clone();
        if let Some(property_collector) = active {
            info!(monitor = %self.id, "cancelling wait for updates");
            match self.session.cancel_wait_for_updates(&property_collector) {
                Ok(()) => info!(monitor = %self.id, "wait for updates cancelled"),
                Err(e) => warn!(monitor = %self.id, error = %e, "failed to cancel wait for updates"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::inventory::Inventory;
    use crate::protocol::{ObjectUpdate, ObjectUpdateKind, PropertyFilterUpdate};
    use crate::session::{ScriptStep, ScriptedSession, SessionCall};

    fn monitor(session: &Arc<ScriptedSession>) -> EventMonitor {
        let cache = Arc::new(Inventory::new(session.clone()));
        EventMonitor::new(MonitorConfig::default(), session.clone(), cache).unwrap()
    }

    fn page(version: &str, val: Value) -> ScriptStep {
        ScriptStep::Updates(UpdateSet {
            version: version.to_string(),
            filter_set: vec![PropertyFilterUpdate {
                filter: ScriptedSession::filter_ref(1),
                object_set: vec![ObjectUpdate {
                    kind: ObjectUpdateKind::Modify,
                    obj: ScriptedSession::collector_ref(1),
                    change_set: vec![PropertyChange::assign("latestPage", val)],
                }],
            }],
        })
    }

    #[test]
    fn rejects_invalid_config() {
        let session = Arc::new(ScriptedSession::with_steps(Vec::new()));
        let cache = Arc::new(Inventory::new(session.clone()));
        let err = EventMonitor::new(MonitorConfig::default().with_page_size(0), session, cache).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "page_size", .. }));
    }

    #[test]
    fn classify_distinguishes_wait_results() {
        let session = Arc::new(ScriptedSession::with_steps(Vec::new()));
        let m = monitor(&session);

        assert!(matches!(m.classify(Ok(None)).unwrap(), WaitOutcome::NoChange));
        assert!(matches!(m.classify(Err(SessionError::ReceiveTimeout)).unwrap(), WaitOutcome::RetryAlive));
        assert!(matches!(
            m.classify(Err(SessionError::fault("WaitForUpdatesEx", "x"))).unwrap_err(),
            MonitorError::Session(_)
        ));

        m.stop();
        assert!(matches!(m.classify(Err(SessionError::Cancelled)).unwrap(), WaitOutcome::Stopped));
    }

    #[test]
    fn classify_reports_lost_connection_when_dead() {
        let session = Arc::new(ScriptedSession::with_steps(Vec::new()));
        let m = monitor(&session);
        session.disconnect().unwrap();

        let err = m.classify(Err(SessionError::ReceiveTimeout)).unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[test]
    fn enrich_changes_flattens_sequences_in_order() {
        let session = Arc::new(ScriptedSession::with_steps(Vec::new()));
        let m = monitor(&session);

        let changes = vec![
            PropertyChange::assign("latestPage", json!({ "_typeName": "A", "key": 1 })),
            PropertyChange::assign("description", json!("ignored")),
            PropertyChange::assign(
                "latestPage",
                json!([{ "_typeName": "B", "key": 2 }, { "_typeName": "C", "key": 3 }]),
            ),
        ];
        let keys: Vec<i64> = m
            .enrich_changes(&changes)
            .unwrap()
            .iter()
            .filter_map(Event::key)
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn second_run_is_rejected() {
        let session = Arc::new(ScriptedSession::with_steps(vec![ScriptStep::ConnectionDrop]));
        let m = monitor(&session);

        assert!(m.monitor_events(|_| Ok::<_, Infallible>(())).is_err());
        let err = m.monitor_events(|_| Ok::<_, Infallible>(())).unwrap_err();
        assert!(matches!(err, MonitorError::AlreadyStarted));
    }

    #[test]
    fn stop_before_start_subscribes_and_tears_down_without_waiting() {
        let session = Arc::new(ScriptedSession::with_steps(vec![page("1", json!({ "_typeName": "A" }))]));
        let m = monitor(&session);
        m.stop();

        m.monitor_events(|_| Ok::<_, Infallible>(())).unwrap();
        assert_eq!(session.wait_count(), 0);
        assert_eq!(session.calls().last(), Some(&SessionCall::Disconnect));
        assert_eq!(m.state(), MonitorState::TornDown);
    }

    #[test]
    fn stop_inside_consumer_ends_loop() {
        let session = Arc::new(ScriptedSession::with_steps(vec![
            page("1", json!({ "_typeName": "A" })),
            page("2", json!({ "_typeName": "B" })),
        ]));
        let m = Arc::new(monitor(&session));
        let handle = Arc::clone(&m);

        let mut seen = 0;
        m.monitor_events(|batch| {
            seen += batch.len();
            handle.stop();
            Ok::<_, Infallible>(())
        })
        .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(session.wait_count(), 1);
        assert!(!m.is_running());
    }

    #[test]
    fn idle_wait_expiry_keeps_polling() {
        let session = Arc::new(ScriptedSession::with_steps(vec![
            ScriptStep::Idle,
            page("1", json!({ "_typeName": "A" })),
        ]));
        let cache = Arc::new(Inventory::new(session.clone()));
        let config = MonitorConfig::default().with_max_wait(Duration::from_secs(1));
        let m = Arc::new(EventMonitor::new(config, session.clone(), cache).unwrap());
        let handle = Arc::clone(&m);

        m.monitor_events(|_| {
            handle.stop();
            Ok::<_, Infallible>(())
        })
        .unwrap();
        assert_eq!(session.wait_count(), 2);
    }
}
