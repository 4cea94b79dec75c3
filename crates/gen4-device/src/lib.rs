//! `gen4-device` owns the kernel device file for each display-controller
//! entity: one descriptor per entity, opened once and kept until teardown,
//! with logical open and DRM-master holds reference-counted on top of it.
//!
//! Everything runs on the driver's single control thread; there is no
//! locking. Kernel races during concurrent entity bring-up are absorbed by a
//! bounded retry policy, not by synchronization.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

pub mod drm;
#[cfg(unix)]
pub mod sys;

pub use drm::{DeviceFd, DrmError, DrmKernel, SimulatedDrm};
#[cfg(unix)]
pub use sys::SysDrm;

/// Interface version spoken over the descriptor; negotiating it also proves
/// the descriptor is master-capable.
const DRM_INTERFACE_MAJOR: i32 = 1;
const DRM_INTERFACE_MINOR: i32 = 1;

/// Index of a display-controller entity.
pub type Entity = usize;

/// PCI slot of the GPU an entity drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PciSlot {
    pub domain: u16,
    pub bus: u8,
    pub dev: u8,
    pub func: u8,
}

impl PciSlot {
    /// The `pci:dddd:bb:dd.f` bus id the kernel interface matches on.
    pub fn bus_id(&self) -> String {
        format!(
            "pci:{:04x}:{:02x}:{:02x}.{}",
            self.domain, self.bus, self.dev, self.func
        )
    }
}

/// Bounded retry: fixed attempt count, fixed delay, no backoff. Exhaustion
/// surfaces as the last attempt's error, not a distinguished timeout.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    /// Roughly two seconds of patience for a contended kernel interface.
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2000,
            interval: Duration::from_millis(1),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn immediate() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

fn run_with_retry<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T, DrmError>,
) -> Result<T, DrmError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(_) if attempt < policy.max_attempts => {
                if !policy.interval.is_zero() {
                    thread::sleep(policy.interval);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug)]
struct DeviceHandle {
    path: String,
    fd: DeviceFd,
    open_count: u32,
    master_count: u32,
}

/// Per-entity device handles.
///
/// The descriptor is opened once by [`DeviceTable::open_device`] and lives
/// until the entity's final close, independent of the open/master counts;
/// those gate logical holds, not the descriptor itself.
#[derive(Debug)]
pub struct DeviceTable<K: DrmKernel> {
    drm: K,
    retry: RetryPolicy,
    devices: HashMap<Entity, DeviceHandle>,
}

impl<K: DrmKernel> DeviceTable<K> {
    pub fn new(drm: K, retry: RetryPolicy) -> DeviceTable<K> {
        DeviceTable {
            drm,
            retry,
            devices: HashMap::new(),
        }
    }

    /// The underlying kernel interface, for collaborators issuing their own
    /// requests over it.
    pub fn drm_mut(&mut self) -> &mut K {
        &mut self.drm
    }

    /// Establish the entity's descriptor. Idempotent: an existing handle is
    /// returned as-is, without touching any counter.
    ///
    /// With no explicit `path`, the device is resolved through the kernel's
    /// modesetting probe; on a cold boot that can require loading the video
    /// module first (and the console driver, as a courtesy to the user).
    pub fn open_device(
        &mut self,
        entity: Entity,
        pci: &PciSlot,
        path: Option<&str>,
    ) -> Result<DeviceFd, DrmError> {
        if let Some(handle) = self.devices.get(&entity) {
            return Ok(handle.fd);
        }

        let (fd, path) = match path {
            Some(path) => (self.drm.open_path(path)?, path.to_owned()),
            None => {
                let bus_id = pci.bus_id();
                if !self.drm.modeset_supported(&bus_id) {
                    let supported = self.drm.load_module("i915").is_ok()
                        && self.drm.modeset_supported(&bus_id);
                    if !supported {
                        return Err(DrmError::ModesetUnsupported { bus_id });
                    }
                    let _ = self.drm.load_module("fbcon");
                }
                self.drm.open_by_bus_id(&bus_id)?
            }
        };

        debug!(entity, %path, fd, "opened display device");
        self.devices.insert(
            entity,
            DeviceHandle {
                path,
                fd,
                open_count: 0,
                master_count: 0,
            },
        );
        Ok(fd)
    }

    /// Take a logical hold on the device. The first hold negotiates the
    /// kernel interface version, retrying through transient contention while
    /// sibling entities initialize; on final failure the hold is rolled back
    /// and the handle stays usable for a later attempt.
    pub fn acquire(&mut self, entity: Entity) -> Result<DeviceFd, DrmError> {
        let DeviceTable { drm, retry, devices } = self;
        let handle = devices.get_mut(&entity).expect("device opened for entity");

        handle.open_count += 1;
        if handle.open_count == 1 {
            let fd = handle.fd;
            let negotiated = run_with_retry(retry, || {
                drm.set_interface_version(fd, DRM_INTERFACE_MAJOR, DRM_INTERFACE_MINOR)
            });
            if let Err(err) = negotiated {
                handle.open_count -= 1;
                error!(entity, %err, "interface version negotiation failed");
                return Err(err);
            }
        }

        Ok(handle.fd)
    }

    /// Drop a logical hold. The hold must exist; releasing an unheld device
    /// is a caller bug. The hold that reaches zero closes the descriptor and
    /// discards the handle.
    pub fn release(&mut self, entity: Entity) {
        let handle = self
            .devices
            .get_mut(&entity)
            .expect("device opened for entity");
        assert!(handle.open_count > 0, "release without matching acquire");

        handle.open_count -= 1;
        if handle.open_count > 0 {
            return;
        }

        let handle = self.devices.remove(&entity).unwrap();
        debug!(entity, path = %handle.path, "closing display device");
        self.drm.close(handle.fd);
    }

    /// Take a logical master hold. The first hold acquires real DRM
    /// mastership, retrying while another master winds down. A failed
    /// acquisition still records the hold; the paired release balances it.
    pub fn acquire_master(&mut self, entity: Entity) -> Result<(), DrmError> {
        let DeviceTable { drm, retry, devices } = self;
        let handle = devices.get_mut(&entity).expect("device opened for entity");

        handle.master_count += 1;
        if handle.master_count == 1 {
            let fd = handle.fd;
            run_with_retry(retry, || drm.set_master(fd))?;
        }

        Ok(())
    }

    /// Drop a logical master hold; underflow is a caller bug. The hold that
    /// reaches zero re-asserts mastership before dropping it for real:
    /// unrelated logical requests may have dropped the real thing behind our
    /// back, and the kernel drop call requires the caller to hold it.
    pub fn release_master(&mut self, entity: Entity) -> Result<(), DrmError> {
        let handle = self
            .devices
            .get_mut(&entity)
            .expect("device opened for entity");
        assert!(
            handle.master_count > 0,
            "master released more times than acquired"
        );

        handle.master_count -= 1;
        if handle.master_count > 0 {
            return Ok(());
        }

        let fd = handle.fd;
        let reasserted = self.drm.set_master(fd);
        assert!(reasserted.is_ok(), "lost mastership while logically held");
        self.drm.drop_master(fd)
    }

    /// Canonical device node path of an entity's handle.
    pub fn device_path(&self, entity: Entity) -> &str {
        &self
            .devices
            .get(&entity)
            .expect("device opened for entity")
            .path
    }

    /// Descriptor of an entity's handle, if one is established.
    pub fn fd(&self, entity: Entity) -> Option<DeviceFd> {
        self.devices.get(&entity).map(|handle| handle.fd)
    }

    /// Entity-teardown close path: reaps the handle only once every logical
    /// hold is gone. With holds outstanding the close is left to the release
    /// that reaches zero.
    pub fn teardown(&mut self, entity: Entity) {
        let Some(handle) = self.devices.get(&entity) else {
            return;
        };
        if handle.open_count != 0 {
            return;
        }

        let handle = self.devices.remove(&entity).unwrap();
        debug!(entity, path = %handle.path, "tearing down display device");
        self.drm.close(handle.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCI: PciSlot = PciSlot {
        domain: 0,
        bus: 0,
        dev: 2,
        func: 0,
    };

    #[test]
    fn bus_id_formats_like_the_kernel_expects() {
        assert_eq!(PCI.bus_id(), "pci:0000:00:02.0");
    }

    #[test]
    fn open_resolves_via_modeset_probe() {
        let drm = SimulatedDrm::with_modeset("pci:0000:00:02.0");
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        let fd = table.open_device(0, &PCI, None).unwrap();
        assert_eq!(table.fd(0), Some(fd));
        assert_eq!(table.device_path(0), "/dev/dri/card0");
    }

    #[test]
    fn cold_boot_loads_the_video_module_and_console() {
        let mut drm = SimulatedDrm::new();
        drm.supported_after_load.push("pci:0000:00:02.0".to_owned());
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        table.open_device(0, &PCI, None).unwrap();
        // i915 makes the probe succeed; fbcon rides along.
        assert_eq!(table.drm_mut().loaded_modules, vec!["i915", "fbcon"]);
    }

    #[test]
    fn unsupported_device_stores_no_handle() {
        let drm = SimulatedDrm::new();
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        assert!(table.open_device(0, &PCI, None).is_err());
        assert_eq!(table.fd(0), None);
    }

    #[test]
    fn explicit_path_skips_the_probe() {
        let drm = SimulatedDrm::new();
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        table.open_device(0, &PCI, Some("/dev/dri/card1")).unwrap();
        assert_eq!(table.device_path(0), "/dev/dri/card1");
    }

    #[test]
    fn teardown_before_any_acquire_closes_the_descriptor() {
        let drm = SimulatedDrm::with_modeset("pci:0000:00:02.0");
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        let fd = table.open_device(0, &PCI, None).unwrap();
        table.teardown(0);
        assert_eq!(table.fd(0), None);
        assert_eq!(table.drm_mut().closed, vec![fd]);
    }

    #[test]
    fn teardown_with_holds_outstanding_defers_to_release() {
        let drm = SimulatedDrm::with_modeset("pci:0000:00:02.0");
        let mut table = DeviceTable::new(drm, RetryPolicy::immediate());

        let fd = table.open_device(0, &PCI, None).unwrap();
        table.acquire(0).unwrap();
        table.teardown(0);
        assert_eq!(table.fd(0), Some(fd), "teardown defers while held");

        table.release(0);
        assert_eq!(table.fd(0), None);
        assert_eq!(table.drm_mut().closed, vec![fd]);
    }
}
