//! Inventory cache consulted while enriching events.
//!
//! The monitor needs three operations from the cache: look a virtual machine
//! up, add one, remove one. It issues them through [`InventoryCache::with_vms`],
//! which holds the cache for a whole pass so other cache users cannot
//! interleave between an add and the lookup that follows it.

mod memory;

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::protocol::MoRef;

pub use memory::Inventory;

/// Cached state of a virtual machine (the `summary.config` fields the
/// monitor reads, plus identification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Reference of the VM.
    pub moref: MoRef,
    /// Display name.
    pub name: String,
    /// Datastore path of the VM's configuration file.
    #[serde(default)]
    pub path_name: Option<String>,
    /// BIOS UUID. Servers report a blank string for VMs without one.
    #[serde(default)]
    pub uuid: Option<String>,
    /// Host the VM runs on.
    #[serde(default)]
    pub host: Option<MoRef>,
}

impl VmRecord {
    /// The configured UUID, with blank values treated as absent.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Cached state of a host system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Reference of the host.
    pub moref: MoRef,
    /// Display name.
    pub name: String,
}

/// VM operations available while a cache is held by [`InventoryCache::with_vms`].
pub trait VmCacheOps {
    /// Get a snapshot of a cached VM.
    fn get(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError>;

    /// Fetch a VM's current state and cache it. Unknown VMs are not cached.
    fn add(&mut self, vm: &MoRef) -> Result<(), InventoryError>;

    /// Drop a VM from the cache. Removing an unknown VM is not an error.
    fn remove(&mut self, vm: &MoRef) -> Result<(), InventoryError>;
}

/// Narrow cache interface used by the event enricher.
pub trait InventoryCache: Send + Sync {
    /// Run `f` with the VM cache held for its whole duration.
    ///
    /// No other cache user observes or mutates VMs between the operations
    /// `f` performs.
    fn with_vms(
        &self,
        f: &mut dyn FnMut(&mut dyn VmCacheOps) -> Result<(), InventoryError>,
    ) -> Result<(), InventoryError>;

    /// Get a snapshot of a cached VM.
    fn lookup_vm(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError> {
        let mut found = None;
        self.with_vms(&mut |vms: &mut dyn VmCacheOps| {
            found = vms.get(vm)?;
            Ok(())
        })?;
        Ok(found)
    }

    /// Fetch a VM's current state and cache it.
    fn add_vm(&self, vm: &MoRef) -> Result<(), InventoryError> {
        self.with_vms(&mut |vms: &mut dyn VmCacheOps| vms.add(vm))
    }

    /// Drop a VM from the cache.
    fn remove_vm(&self, vm: &MoRef) -> Result<(), InventoryError> {
        self.with_vms(&mut |vms: &mut dyn VmCacheOps| vms.remove(vm))
    }
}

/// Where an inventory gets object state from, usually the remote session.
pub trait InventorySource: Send + Sync {
    /// All host systems visible to the session.
    fn list_hosts(&self) -> Result<Vec<HostRecord>, InventoryError>;

    /// All virtual machines visible to the session.
    fn list_vms(&self) -> Result<Vec<VmRecord>, InventoryError>;

    /// Current state of a single VM, `None` if the server does not know it.
    fn fetch_vm(&self, vm: &MoRef) -> Result<Option<VmRecord>, InventoryError>;
}
