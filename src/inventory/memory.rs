//! In-memory inventory cache.
//!
//! Thread-safe cache of hosts and virtual machines keyed by reference, guarded
//! by a single reader/writer lock. Single-call fetches happen outside the
//! lock; a `with_vms` pass holds the write lock, fetches included.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::InventoryError;
use crate::inventory::{HostRecord, InventoryCache, InventorySource, VmCacheOps, VmRecord};
use crate::protocol::MoRef;

fn lock_err(context: &'static str) -> InventoryError {
    InventoryError::PoisonedLock { context }
}

#[derive(Debug, Default)]
struct InventoryState {
    hosts: HashMap<MoRef, HostRecord>,
    vms: HashMap<MoRef, VmRecord>,
}

/// VM map borrowed for the duration of one `with_vms` pass.
struct VmPass<'a> {
    source: &'a dyn InventorySource,
    vms: &'a mut HashMap<MoRef, VmRecord>,
}

impl VmCacheOps for VmPass<'_> {
    fn get(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError> {
        Ok(self.vms.get(vm).cloned())
    }

    fn add(&mut self, vm: &MoRef) -> Result<(), InventoryError> {
        match self.source.fetch_vm(vm)? {
            Some(record) => {
                self.vms.insert(vm.clone(), record);
            }
            None => debug!(vm = %vm, "vm unknown to source, not cached"),
        }
        Ok(())
    }

    fn remove(&mut self, vm: &MoRef) -> Result<(), InventoryError> {
        self.vms.remove(vm);
        Ok(())
    }
}

/// Inventory of hosts and VMs populated from an [`InventorySource`].
pub struct Inventory {
    source: Arc<dyn InventorySource>,
    state: RwLock<InventoryState>,
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory").field("state", &self.state).finish_non_exhaustive()
    }
}

impl Inventory {
    /// Create an empty inventory backed by `source`.
    #[must_use]
    pub fn new(source: Arc<dyn InventorySource>) -> Self {
        Self {
            source,
            state: RwLock::new(InventoryState::default()),
        }
    }

    /// Create an inventory and populate hosts and VMs from `source`.
    pub fn load(source: Arc<dyn InventorySource>) -> Result<Self, InventoryError> {
        let inventory = Self::new(source);
        inventory.refresh()?;
        Ok(inventory)
    }

    /// Replace cached hosts and VMs with the source's current lists.
    pub fn refresh(&self) -> Result<(), InventoryError> {
        let hosts = self.source.list_hosts()?;
        let vms = self.source.list_vms()?;

        let mut state = self.state.write().map_err(|_| lock_err("inventory.refresh"))?;
        state.hosts = hosts.into_iter().map(|h| (h.moref.clone(), h)).collect();
        state.vms = vms.into_iter().map(|v| (v.moref.clone(), v)).collect();
        debug!(hosts = state.hosts.len(), vms = state.vms.len(), "inventory loaded");
        Ok(())
    }

    /// Get a cached host.
    pub fn host(&self, host: &MoRef) -> Result<Option<HostRecord>, InventoryError> {
        let state = self.state.read().map_err(|_| lock_err("inventory.host"))?;
        Ok(state.hosts.get(host).cloned())
    }

    /// Number of cached hosts.
    pub fn host_count(&self) -> Result<usize, InventoryError> {
        let state = self.state.read().map_err(|_| lock_err("inventory.host_count"))?;
        Ok(state.hosts.len())
    }

    /// Number of cached VMs.
    pub fn vm_count(&self) -> Result<usize, InventoryError> {
        let state = self.state.read().map_err(|_| lock_err("inventory.vm_count"))?;
        Ok(state.vms.len())
    }

    /// References of all cached VMs, sorted.
    pub fn vm_refs(&self) -> Result<Vec<MoRef>, InventoryError> {
        let state = self.state.read().map_err(|_| lock_err("inventory.vm_refs"))?;
        let mut refs: Vec<MoRef> = state.vms.keys().cloned().collect();
        refs.sort();
        Ok(refs)
    }
}

impl InventoryCache for Inventory {
    fn with_vms(
        &self,
        f: &mut dyn FnMut(&mut dyn VmCacheOps) -> Result<(), InventoryError>,
    ) -> Result<(), InventoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("inventory.with_vms"))?;
        let mut pass = VmPass {
            source: &*self.source,
            vms: &mut state.vms,
        };
        f(&mut pass)
    }

    fn lookup_vm(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError> {
        let state = self.state.read().map_err(|_| lock_err("inventory.lookup_vm"))?;
        Ok(state.vms.get(vm).cloned())
    }

    fn add_vm(&self, vm: &MoRef) -> Result<(), InventoryError> {
        let Some(record) = self.source.fetch_vm(vm)? else {
            debug!(vm = %vm, "vm unknown to source, not cached");
            return Ok(());
        };

        let mut state = self.state.write().map_err(|_| lock_err("inventory.add_vm"))?;
        state.vms.insert(vm.clone(), record);
        Ok(())
    }

    fn remove_vm(&self, vm: &MoRef) -> Result<(), InventoryError> {
        let mut state = self.state.write().map_err(|_| lock_err("inventory.remove_vm"))?;
        state.vms.remove(vm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeSource {
        hosts: Vec<HostRecord>,
        vms: Mutex<HashMap<MoRef, VmRecord>>,
    }

    impl FakeSource {
        fn with_vm(self, vm: VmRecord) -> Self {
            self.vms.lock().unwrap().insert(vm.moref.clone(), vm);
            self
        }
    }

    impl InventorySource for FakeSource {
        fn list_hosts(&self) -> Result<Vec<HostRecord>, InventoryError> {
            Ok(self.hosts.clone())
        }

        fn list_vms(&self) -> Result<Vec<VmRecord>, InventoryError> {
            Ok(self.vms.lock().unwrap().values().cloned().collect())
        }

        fn fetch_vm(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError> {
            Ok(self.vms.lock().unwrap().get(vm).cloned())
        }
    }

    fn vm(id: &str, path: &str) -> VmRecord {
        VmRecord {
            moref: MoRef::vm(id),
            name: id.to_string(),
            path_name: Some(path.to_string()),
            uuid: None,
            host: None,
        }
    }

    #[test]
    fn load_populates_hosts_and_vms() {
        let source = FakeSource {
            hosts: vec![HostRecord {
                moref: MoRef::host("host-1"),
                name: "esx01".to_string(),
            }],
            ..FakeSource::default()
        }
        .with_vm(vm("vm-1", "[ds1] a/a.vmx"))
        .with_vm(vm("vm-2", "[ds1] b/b.vmx"));

        let inv = Inventory::load(Arc::new(source)).unwrap();
        assert_eq!(inv.host_count().unwrap(), 1);
        assert_eq!(inv.vm_count().unwrap(), 2);
        assert_eq!(inv.vm_refs().unwrap(), vec![MoRef::vm("vm-1"), MoRef::vm("vm-2")]);
        assert_eq!(inv.host(&MoRef::host("host-1")).unwrap().unwrap().name, "esx01");
    }

    #[test]
    fn add_vm_fetches_from_source() {
        let source = Arc::new(FakeSource::default());
        let inv = Inventory::load(source.clone()).unwrap();
        assert!(inv.lookup_vm(&MoRef::vm("vm-9")).unwrap().is_none());

        source.vms.lock().unwrap().insert(MoRef::vm("vm-9"), vm("vm-9", "[ds2] n/n.vmx"));
        inv.add_vm(&MoRef::vm("vm-9")).unwrap();

        let cached = inv.lookup_vm(&MoRef::vm("vm-9")).unwrap().unwrap();
        assert_eq!(cached.path_name.as_deref(), Some("[ds2] n/n.vmx"));
    }

    #[test]
    fn add_unknown_vm_is_noop() {
        let inv = Inventory::load(Arc::new(FakeSource::default())).unwrap();
        inv.add_vm(&MoRef::vm("ghost")).unwrap();
        assert_eq!(inv.vm_count().unwrap(), 0);
    }

    #[test]
    fn remove_then_add_refreshes_snapshot() {
        let source = Arc::new(FakeSource::default().with_vm(vm("vm-1", "[old] a/a.vmx")));
        let inv = Inventory::load(source.clone()).unwrap();

        source.vms.lock().unwrap().insert(MoRef::vm("vm-1"), vm("vm-1", "[new] a/a.vmx"));
        inv.remove_vm(&MoRef::vm("vm-1")).unwrap();
        assert!(inv.lookup_vm(&MoRef::vm("vm-1")).unwrap().is_none());
        inv.add_vm(&MoRef::vm("vm-1")).unwrap();

        let cached = inv.lookup_vm(&MoRef::vm("vm-1")).unwrap().unwrap();
        assert_eq!(cached.path_name.as_deref(), Some("[new] a/a.vmx"));
    }

    #[test]
    fn with_vms_sees_its_own_changes() {
        let source = Arc::new(FakeSource::default().with_vm(vm("vm-4", "[ds1] d/d.vmx")));
        let inv = Inventory::new(source);

        let mut seen = None;
        inv.with_vms(&mut |vms: &mut dyn VmCacheOps| {
            vms.add(&MoRef::vm("vm-4"))?;
            seen = vms.get(&MoRef::vm("vm-4"))?.and_then(|r| r.path_name);
            vms.remove(&MoRef::vm("vm-4"))
        })
        .unwrap();

        assert_eq!(seen.as_deref(), Some("[ds1] d/d.vmx"));
        assert_eq!(inv.vm_count().unwrap(), 0);
    }

    #[test]
    fn remove_unknown_vm_is_ok() {
        let inv = Inventory::new(Arc::new(FakeSource::default()));
        assert!(inv.remove_vm(&MoRef::vm("nope")).is_ok());
    }
}
