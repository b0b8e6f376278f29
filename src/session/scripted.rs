//! Scripted in-process session.
//!
//! Plays back a fixed sequence of wait outcomes and records every call the
//! monitor makes. Used by tests and by the replay binary; it doubles as the
//! inventory source so VM state can change while a script runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, SessionError};
use crate::inventory::{HostRecord, InventorySource, VmRecord};
use crate::protocol::{EventFilterSpec, MoRef, PropertyFilterSpec, UpdateSet};

use super::{RemoteSession, WaitOptions};

/// One scripted outcome of `wait_for_updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Return this update set.
    Updates(UpdateSet),
    /// The bounded wait expired without changes.
    NoChange,
    /// Block for up to the wait budget; a cancel ends the wait early.
    Idle,
    /// Receive timeout while the session stays alive.
    ReceiveTimeout,
    /// Receive timeout after which the session is dead.
    ConnectionDrop,
    /// The server rejects the wait.
    Fault { message: String },
}

/// A recorded session: initial inventory plus wait outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Hosts the session reports.
    pub hosts: Vec<HostRecord>,
    /// VMs the session reports and serves fetches from.
    pub vms: Vec<VmRecord>,
    /// Outcomes of successive wait calls.
    pub steps: Vec<ScriptStep>,
}

/// A call observed by the scripted session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    /// `create_event_collector`.
    CreateEventCollector {
        /// Filter the collector was created with.
        filter: EventFilterSpec,
    },
    /// `set_collector_page_size`.
    SetCollectorPageSize {
        /// Collector resized.
        collector: MoRef,
        /// Requested page size.
        page_size: u32,
    },
    /// `create_filter`.
    CreateFilter {
        /// Installed spec.
        spec: PropertyFilterSpec,
        /// Whether partial updates were requested.
        partial_updates: bool,
    },
    /// `wait_for_updates`.
    WaitForUpdates {
        /// Cursor passed in.
        version: Option<String>,
    },
    /// `cancel_wait_for_updates`.
    CancelWaitForUpdates,
    /// `destroy_filter`.
    DestroyFilter {
        /// Filter destroyed.
        filter: MoRef,
    },
    /// `disconnect`.
    Disconnect,
}

/// Session that replays a [`Script`].
///
/// Collectors and filters are numbered from 1 in creation order, so the first
/// filter is always [`ScriptedSession::filter_ref(1)`](Self::filter_ref).
/// Once the steps run out the session reports a dropped connection.
pub struct ScriptedSession {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<SessionCall>>,
    hosts: Vec<HostRecord>,
    vms: RwLock<HashMap<MoRef, VmRecord>>,
    alive: AtomicBool,
    connected: AtomicBool,
    exhausted: AtomicBool,
    next_collector: AtomicU32,
    next_filter: AtomicU32,
    create_filter_fault: Option<String>,
    destroy_filter_fault: Option<String>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedSession {
    /// Session replaying `script`.
    #[must_use]
    pub fn new(script: Script) -> Self {
        let (cancel_tx, cancel_rx) = bounded(1);
        Self {
            steps: Mutex::new(script.steps.into()),
            calls: Mutex::new(Vec::new()),
            hosts: script.hosts,
            vms: RwLock::new(script.vms.into_iter().map(|vm| (vm.moref.clone(), vm)).collect()),
            alive: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            exhausted: AtomicBool::new(false),
            next_collector: AtomicU32::new(1),
            next_filter: AtomicU32::new(1),
            create_filter_fault: None,
            destroy_filter_fault: None,
            cancel_tx,
            cancel_rx,
        }
    }

    /// Session with no inventory that plays `steps`.
    #[must_use]
    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self::new(Script {
            steps,
            ..Script::default()
        })
    }

    /// Make `create_filter` fail with `message`.
    #[must_use]
    pub fn fail_create_filter(mut self, message: impl Into<String>) -> Self {
        self.create_filter_fault = Some(message.into());
        self
    }

    /// Make `destroy_filter` fail with `message`.
    #[must_use]
    pub fn fail_destroy_filter(mut self, message: impl Into<String>) -> Self {
        self.destroy_filter_fault = Some(message.into());
        self
    }

    /// Reference of the `n`th filter this session creates.
    #[must_use]
    pub fn filter_ref(n: u32) -> MoRef {
        MoRef::new("PropertyFilter", format!("filter-{n}"))
    }

    /// Reference of the `n`th event collector this session creates.
    #[must_use]
    pub fn collector_ref(n: u32) -> MoRef {
        MoRef::new("EventHistoryCollector", format!("collector-{n}"))
    }

    /// Append a step to the end of the script.
    pub fn push_step(&self, step: ScriptStep) {
        guard(&self.steps).push_back(step);
    }

    /// Change (or add) a VM as the server sees it.
    pub fn put_vm(&self, vm: VmRecord) {
        self.vms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(vm.moref.clone(), vm);
    }

    /// Calls observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SessionCall> {
        guard(&self.calls).clone()
    }

    /// Number of `wait_for_updates` calls observed so far.
    #[must_use]
    pub fn wait_count(&self) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| matches!(c, SessionCall::WaitForUpdates { .. }))
            .count()
    }

    /// True once a wait found no step left to play.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// False once `disconnect` was called.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn record(&self, call: SessionCall) {
        guard(&self.calls).push(call);
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSession")
            .field("remaining_steps", &guard(&self.steps).len())
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RemoteSession for ScriptedSession {
    fn event_manager(&self) -> MoRef {
        MoRef::new("EventManager", "EventManager")
    }

    fn property_collector(&self) -> MoRef {
        MoRef::new("PropertyCollector", "propertyCollector")
    }

    fn create_event_collector(&self, _event_manager: &MoRef, filter: &EventFilterSpec) -> Result<MoRef, SessionError> {
        self.ensure_connected()?;
        self.record(SessionCall::CreateEventCollector { filter: filter.clone() });
        Ok(Self::collector_ref(self.next_collector.fetch_add(1, Ordering::AcqRel)))
    }

    fn set_collector_page_size(&self, collector: &MoRef, page_size: u32) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.record(SessionCall::SetCollectorPageSize {
            collector: collector.clone(),
            page_size,
        });
        Ok(())
    }

    fn create_filter(
        &self,
        _property_collector: &MoRef,
        spec: &PropertyFilterSpec,
        partial_updates: bool,
    ) -> Result<MoRef, SessionError> {
        self.ensure_connected()?;
        self.record(SessionCall::CreateFilter {
            spec: spec.clone(),
            partial_updates,
        });
        if let Some(message) = &self.create_filter_fault {
            return Err(SessionError::fault("CreateFilter", message.clone()));
        }
        Ok(Self::filter_ref(self.next_filter.fetch_add(1, Ordering::AcqRel)))
    }

    fn wait_for_updates(
        &self,
        _property_collector: &MoRef,
        version: Option<&str>,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>, SessionError> {
        self.ensure_connected()?;
        self.record(SessionCall::WaitForUpdates {
            version: version.map(str::to_string),
        });

        let step = guard(&self.steps).pop_front();
        match step {
            Some(ScriptStep::Updates(set)) => Ok(Some(set)),
            Some(ScriptStep::NoChange) => Ok(None),
            Some(ScriptStep::Idle) => match self.cancel_rx.recv_timeout(options.max_wait) {
                Ok(()) => Err(SessionError::Cancelled),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(SessionError::NotConnected),
            },
            Some(ScriptStep::ReceiveTimeout) => Err(SessionError::ReceiveTimeout),
            Some(ScriptStep::ConnectionDrop) => {
                self.alive.store(false, Ordering::Release);
                Err(SessionError::ReceiveTimeout)
            }
            Some(ScriptStep::Fault { message }) => Err(SessionError::fault("WaitForUpdatesEx", message)),
            None => {
                self.exhausted.store(true, Ordering::Release);
                self.alive.store(false, Ordering::Release);
                Err(SessionError::ReceiveTimeout)
            }
        }
    }

    fn cancel_wait_for_updates(&self, _property_collector: &MoRef) -> Result<(), SessionError> {
        self.record(SessionCall::CancelWaitForUpdates);
        // A full channel already holds a pending cancel.
        let _ = self.cancel_tx.try_send(());
        Ok(())
    }

    fn destroy_filter(&self, filter: &MoRef) -> Result<(), SessionError> {
        self.record(SessionCall::DestroyFilter { filter: filter.clone() });
        if let Some(message) = &self.destroy_filter_fault {
            return Err(SessionError::fault("DestroyPropertyFilter", message.clone()));
        }
        self.ensure_connected()
    }

    fn is_alive(&self) -> bool {
        self.is_connected() && self.alive.load(Ordering::Acquire)
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        self.record(SessionCall::Disconnect);
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

impl InventorySource for ScriptedSession {
    fn list_hosts(&self) -> Result<Vec<HostRecord>, InventoryError> {
        Ok(self.hosts.clone())
    }

    fn list_vms(&self) -> Result<Vec<VmRecord>, InventoryError> {
        let vms = self.vms.read().map_err(|_| InventoryError::PoisonedLock {
            context: "scripted.list_vms",
        })?;
        Ok(vms.values().cloned().collect())
    }

    fn fetch_vm(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError> {
        let vms = self.vms.read().map_err(|_| InventoryError::PoisonedLock {
            context: "scripted.fetch_vm",
        })?;
        Ok(vms.get(vm).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn opts() -> WaitOptions {
        WaitOptions::with_max_wait(Duration::from_millis(20))
    }

    #[test]
    fn filters_are_numbered_in_creation_order() {
        let session = ScriptedSession::with_steps(Vec::new());
        let pc = session.property_collector();
        let spec = PropertyFilterSpec::latest_page(&ScriptedSession::collector_ref(1));

        assert_eq!(session.create_filter(&pc, &spec, true).unwrap(), ScriptedSession::filter_ref(1));
        assert_eq!(session.create_filter(&pc, &spec, true).unwrap(), ScriptedSession::filter_ref(2));
    }

    #[test]
    fn idle_step_expires_to_no_change() {
        let session = ScriptedSession::with_steps(vec![ScriptStep::Idle]);
        let pc = session.property_collector();
        assert_eq!(session.wait_for_updates(&pc, None, &opts()).unwrap(), None);
    }

    #[test]
    fn idle_step_ends_on_cancel() {
        let session = ScriptedSession::with_steps(vec![ScriptStep::Idle]);
        let pc = session.property_collector();
        session.cancel_wait_for_updates(&pc).unwrap();

        let err = session
            .wait_for_updates(&pc, Some("3"), &WaitOptions::with_max_wait(Duration::from_secs(5)))
            .unwrap_err();
        assert_eq!(err, SessionError::Cancelled);
    }

    #[test]
    fn connection_drop_kills_liveness() {
        let session = ScriptedSession::with_steps(vec![ScriptStep::ReceiveTimeout, ScriptStep::ConnectionDrop]);
        let pc = session.property_collector();

        assert!(session.wait_for_updates(&pc, None, &opts()).unwrap_err().is_receive_timeout());
        assert!(session.is_alive());
        assert!(session.wait_for_updates(&pc, None, &opts()).unwrap_err().is_receive_timeout());
        assert!(!session.is_alive());
    }

    #[test]
    fn exhausted_script_reports_dead_connection() {
        let session = ScriptedSession::with_steps(Vec::new());
        let pc = session.property_collector();

        assert!(session.wait_for_updates(&pc, None, &opts()).unwrap_err().is_receive_timeout());
        assert!(session.is_exhausted());
        assert!(!session.is_alive());
    }

    #[test]
    fn disconnect_rejects_further_calls() {
        let session = ScriptedSession::with_steps(vec![ScriptStep::NoChange]);
        session.disconnect().unwrap();

        let pc = session.property_collector();
        assert_eq!(session.wait_for_updates(&pc, None, &opts()).unwrap_err(), SessionError::NotConnected);
        assert!(!session.is_alive());
    }

    #[test]
    fn script_parses_from_json() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vms": [{ "moref": { "type": "VirtualMachine", "value": "vm-1" }, "name": "web" }],
            "steps": [
                { "step": "no_change" },
                { "step": "updates", "version": "1", "filter_set": [] },
                { "step": "fault", "message": "NotAuthenticated" }
            ]
        }))
        .unwrap();

        assert_eq!(script.vms.len(), 1);
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(&script.steps[1], ScriptStep::Updates(set) if set.version == "1"));
    }
}
