//! Event subscription setup and teardown.
//!
//! A `Subscription` owns the server-side filter for one monitoring run. It
//! tears itself down when dropped, so the filter is destroyed and the session
//! disconnected on every exit path, including panics in a consumer.

use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::error::SessionError;
use crate::protocol::{MoRef, PropertyFilterSpec};
use crate::session::RemoteSession;

use super::state::MonitorId;

pub(crate) struct Subscription<'a> {
    session: &'a dyn RemoteSession,
    monitor_id: MonitorId,
    property_collector: MoRef,
    filter: Option<MoRef>,
    torn_down: bool,
}

impl<'a> Subscription<'a> {
    /// Start a subscription scope. No remote calls are made yet.
    pub(crate) fn begin(session: &'a dyn RemoteSession, monitor_id: MonitorId) -> Self {
        Self {
            property_collector: session.property_collector(),
            session,
            monitor_id,
            filter: None,
            torn_down: false,
        }
    }

    pub(crate) fn property_collector(&self) -> &MoRef {
        &self.property_collector
    }

    /// Create the event collector and install a latest-page filter on it.
    pub(crate) fn install(&mut self, config: &MonitorConfig) -> Result<MoRef, SessionError> {
        let event_manager = self.session.event_manager();
        let collector = self.session.create_event_collector(&event_manager, &config.event_filter)?;
        self.session.set_collector_page_size(&collector, config.page_size)?;

        let spec = PropertyFilterSpec::latest_page(&collector);
        let filter = self.session.create_filter(&self.property_collector, &spec, true)?;
        info!(
            monitor = %self.monitor_id,
            collector = %collector,
            filter = %filter,
            "event subscription established"
        );
        self.filter = Some(filter.clone());
        Ok(filter)
    }

    /// Destroy the filter (if one was installed) and disconnect. Runs once;
    /// failures are logged, never returned.
    pub(crate) fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(filter) = self.filter.take() {
            info!(monitor = %self.monitor_id, filter = %filter, "destroying property filter");
            match self.session.destroy_filter(&filter) {
                Ok(()) => info!(monitor = %self.monitor_id, "property filter destroyed"),
                Err(e) => warn!(monitor = %self.monitor_id, error = %e, "failed to destroy property filter"),
            }
        }

        match self.session.disconnect() {
            Ok(()) => info!(monitor = %self.monitor_id, "session disconnected"),
            Err(e) => warn!(monitor = %self.monitor_id, error = %e, "failed to disconnect session"),
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ScriptedSession, SessionCall};

    #[test]
    fn install_creates_collector_then_filter() {
        let session = ScriptedSession::with_steps(Vec::new());
        let config = MonitorConfig::default().with_page_size(25);

        let mut sub = Subscription::begin(&session, MonitorId::new());
        let filter = sub.install(&config).unwrap();
        assert_eq!(filter, ScriptedSession::filter_ref(1));

        let collector = ScriptedSession::collector_ref(1);
        assert_eq!(
            session.calls(),
            vec![
                SessionCall::CreateEventCollector {
                    filter: config.event_filter.clone()
                },
                SessionCall::SetCollectorPageSize {
                    collector: collector.clone(),
                    page_size: 25
                },
                SessionCall::CreateFilter {
                    spec: PropertyFilterSpec::latest_page(&collector),
                    partial_updates: true
                },
            ]
        );
    }

    #[test]
    fn drop_destroys_filter_then_disconnects() {
        let session = ScriptedSession::with_steps(Vec::new());
        {
            let mut sub = Subscription::begin(&session, MonitorId::new());
            sub.install(&MonitorConfig::default()).unwrap();
        }

        let calls = session.calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                SessionCall::DestroyFilter {
                    filter: ScriptedSession::filter_ref(1)
                },
                SessionCall::Disconnect
            ]
        );
    }

    #[test]
    fn teardown_without_filter_only_disconnects() {
        let session = ScriptedSession::with_steps(Vec::new()).fail_create_filter("InvalidArgument");
        {
            let mut sub = Subscription::begin(&session, MonitorId::new());
            assert!(sub.install(&MonitorConfig::default()).is_err());
        }

        let calls = session.calls();
        assert!(!calls.iter().any(|c| matches!(c, SessionCall::DestroyFilter { .. })));
        assert_eq!(calls.last(), Some(&SessionCall::Disconnect));
    }

    #[test]
    fn teardown_runs_once() {
        let session = ScriptedSession::with_steps(Vec::new());
        let mut sub = Subscription::begin(&session, MonitorId::new());
        sub.install(&MonitorConfig::default()).unwrap();
        sub.teardown();
        sub.teardown();
        drop(sub);

        let disconnects = session.calls().iter().filter(|c| **c == SessionCall::Disconnect).count();
        assert_eq!(disconnects, 1);
    }

    #[test]
    fn destroy_failure_still_disconnects() {
        let session = ScriptedSession::with_steps(Vec::new()).fail_destroy_filter("ManagedObjectNotFound");
        let mut sub = Subscription::begin(&session, MonitorId::new());
        sub.install(&MonitorConfig::default()).unwrap();
        sub.teardown();

        assert_eq!(session.calls().last(), Some(&SessionCall::Disconnect));
        assert!(!session.is_connected());
    }
}
