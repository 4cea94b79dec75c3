//! The kernel-side DRM interface the device table drives, as a trait so the
//! reference-counting and retry logic can run against a scripted double.

use thiserror::Error;

/// Raw descriptor of the opened device node.
pub type DeviceFd = i32;

#[derive(Debug, Error)]
pub enum DrmError {
    #[error("kernel modesetting unsupported on {bus_id}")]
    ModesetUnsupported { bus_id: String },
    #[error("no device node found for {bus_id}")]
    DeviceNotFound { bus_id: String },
    #[error("opening {path} failed (errno {errno})")]
    Open { path: String, errno: i32 },
    #[error("{name} failed (errno {errno})")]
    Ioctl { name: &'static str, errno: i32 },
    #[error("loading kernel module {name} failed")]
    ModuleLoad { name: &'static str },
}

pub trait DrmKernel {
    /// Does the kernel drive this PCI device with modesetting?
    fn modeset_supported(&mut self, bus_id: &str) -> bool;

    /// Load a kernel module by name.
    fn load_module(&mut self, name: &'static str) -> Result<(), DrmError>;

    /// Open the device node matching a PCI bus id, returning the descriptor
    /// and the canonical node path.
    fn open_by_bus_id(&mut self, bus_id: &str) -> Result<(DeviceFd, String), DrmError>;

    /// Open an explicit device node path, close-on-exec.
    fn open_path(&mut self, path: &str) -> Result<DeviceFd, DrmError>;

    /// Negotiate the interface version used to talk to the descriptor. Also
    /// proves the descriptor is master-capable.
    fn set_interface_version(&mut self, fd: DeviceFd, major: i32, minor: i32)
        -> Result<(), DrmError>;

    fn set_master(&mut self, fd: DeviceFd) -> Result<(), DrmError>;

    fn drop_master(&mut self, fd: DeviceFd) -> Result<(), DrmError>;

    fn close(&mut self, fd: DeviceFd);
}

/// Scripted [`DrmKernel`] for tests: fails each call a configured number of
/// times, then succeeds, and counts everything.
#[derive(Debug, Default)]
pub struct SimulatedDrm {
    next_fd: DeviceFd,
    /// Bus ids the kernel claims modesetting for. Loading any module adds
    /// `supported_after_load`.
    pub modeset_bus_ids: Vec<String>,
    pub supported_after_load: Vec<String>,
    pub loaded_modules: Vec<&'static str>,
    pub open_calls: u32,
    pub set_version_failures: u32,
    pub set_version_calls: u32,
    pub set_master_failures: u32,
    pub set_master_calls: u32,
    pub drop_master_calls: u32,
    pub closed: Vec<DeviceFd>,
}

impl SimulatedDrm {
    pub fn new() -> SimulatedDrm {
        SimulatedDrm {
            next_fd: 40,
            ..SimulatedDrm::default()
        }
    }

    /// A kernel that already modesets `bus_id`.
    pub fn with_modeset(bus_id: &str) -> SimulatedDrm {
        let mut drm = SimulatedDrm::new();
        drm.modeset_bus_ids.push(bus_id.to_owned());
        drm
    }
}

impl DrmKernel for SimulatedDrm {
    fn modeset_supported(&mut self, bus_id: &str) -> bool {
        self.modeset_bus_ids.iter().any(|id| id == bus_id)
    }

    fn load_module(&mut self, name: &'static str) -> Result<(), DrmError> {
        self.loaded_modules.push(name);
        self.modeset_bus_ids.extend(self.supported_after_load.drain(..));
        Ok(())
    }

    fn open_by_bus_id(&mut self, bus_id: &str) -> Result<(DeviceFd, String), DrmError> {
        if !self.modeset_supported(bus_id) {
            return Err(DrmError::DeviceNotFound {
                bus_id: bus_id.to_owned(),
            });
        }
        self.open_calls += 1;
        let fd = self.next_fd;
        self.next_fd += 1;
        Ok((fd, "/dev/dri/card0".to_owned()))
    }

    fn open_path(&mut self, path: &str) -> Result<DeviceFd, DrmError> {
        let _ = path;
        self.open_calls += 1;
        let fd = self.next_fd;
        self.next_fd += 1;
        Ok(fd)
    }

    fn set_interface_version(
        &mut self,
        _fd: DeviceFd,
        _major: i32,
        _minor: i32,
    ) -> Result<(), DrmError> {
        self.set_version_calls += 1;
        if self.set_version_failures > 0 {
            self.set_version_failures -= 1;
            return Err(DrmError::Ioctl {
                name: "DRM_IOCTL_SET_VERSION",
                errno: EACCES,
            });
        }
        Ok(())
    }

    fn set_master(&mut self, _fd: DeviceFd) -> Result<(), DrmError> {
        self.set_master_calls += 1;
        if self.set_master_failures > 0 {
            self.set_master_failures -= 1;
            return Err(DrmError::Ioctl {
                name: "DRM_IOCTL_SET_MASTER",
                errno: EACCES,
            });
        }
        Ok(())
    }

    fn drop_master(&mut self, _fd: DeviceFd) -> Result<(), DrmError> {
        self.drop_master_calls += 1;
        Ok(())
    }

    fn close(&mut self, fd: DeviceFd) {
        self.closed.push(fd);
    }
}

const EACCES: i32 = 13;
