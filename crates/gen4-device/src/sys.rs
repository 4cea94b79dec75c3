//! Production [`DrmKernel`] speaking to the kernel through `/dev/dri` and raw
//! DRM ioctls.

use std::ffi::CString;
use std::fs;
use std::process::Command;

use tracing::{debug, warn};

use crate::drm::{DeviceFd, DrmError, DrmKernel};

const DRM_IOCTL_BASE: libc::c_ulong = b'd' as libc::c_ulong;

macro_rules! drm_io {
    ($nr:expr) => {
        (2u64 << 30) | (DRM_IOCTL_BASE << 8) | ($nr as libc::c_ulong)
    };
}

macro_rules! drm_iowr {
    ($nr:expr, $sz:expr) => {
        (3u64 << 30) | (($sz as libc::c_ulong) << 16) | (DRM_IOCTL_BASE << 8) | ($nr as libc::c_ulong)
    };
}

#[repr(C)]
#[derive(Default)]
struct DrmSetVersion {
    drm_di_major: libc::c_int,
    drm_di_minor: libc::c_int,
    drm_dd_major: libc::c_int,
    drm_dd_minor: libc::c_int,
}

const DRM_IOCTL_SET_VERSION: libc::c_ulong = drm_iowr!(0x07, std::mem::size_of::<DrmSetVersion>());
const DRM_IOCTL_SET_MASTER: libc::c_ulong = drm_io!(0x1e);
const DRM_IOCTL_DROP_MASTER: libc::c_ulong = drm_io!(0x1f);

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Sysfs PCI address of a `pci:dddd:bb:dd.f` bus id.
fn sysfs_pci_addr(bus_id: &str) -> Option<&str> {
    bus_id.strip_prefix("pci:")
}

/// The real kernel interface.
#[derive(Debug, Default)]
pub struct SysDrm;

impl SysDrm {
    pub fn new() -> SysDrm {
        SysDrm
    }

    fn drm_ioctl(
        &self,
        fd: DeviceFd,
        request: libc::c_ulong,
        arg: *mut libc::c_void,
        name: &'static str,
    ) -> Result<(), DrmError> {
        // SAFETY: request/argument pairs are fixed DRM contracts; arg either
        // points at a matching repr(C) struct or is null for argument-less
        // requests.
        let ret = unsafe { libc::ioctl(fd, request, arg) };
        if ret != 0 {
            return Err(DrmError::Ioctl {
                name,
                errno: last_errno(),
            });
        }
        Ok(())
    }
}

impl DrmKernel for SysDrm {
    fn modeset_supported(&mut self, bus_id: &str) -> bool {
        // The kernel exposes a drm directory under the PCI device once a
        // modesetting driver has bound it.
        let Some(addr) = sysfs_pci_addr(bus_id) else {
            return false;
        };
        let drm_dir = format!("/sys/bus/pci/devices/{addr}/drm");
        match fs::read_dir(drm_dir) {
            Ok(mut entries) => entries.any(|e| {
                e.map(|e| e.file_name().to_string_lossy().starts_with("card"))
                    .unwrap_or(false)
            }),
            Err(_) => false,
        }
    }

    fn load_module(&mut self, name: &'static str) -> Result<(), DrmError> {
        debug!(module = name, "loading kernel module");
        let status = Command::new("/sbin/modprobe")
            .arg(name)
            .status()
            .map_err(|_| DrmError::ModuleLoad { name })?;
        if !status.success() {
            return Err(DrmError::ModuleLoad { name });
        }
        Ok(())
    }

    fn open_by_bus_id(&mut self, bus_id: &str) -> Result<(DeviceFd, String), DrmError> {
        let addr = sysfs_pci_addr(bus_id).ok_or_else(|| DrmError::DeviceNotFound {
            bus_id: bus_id.to_owned(),
        })?;

        // Find the card node the PCI device backs.
        let entries = fs::read_dir("/sys/class/drm").map_err(|_| DrmError::DeviceNotFound {
            bus_id: bus_id.to_owned(),
        })?;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("card") || name.contains('-') {
                continue;
            }
            let device_link = entry.path().join("device");
            let Ok(target) = fs::canonicalize(&device_link) else {
                continue;
            };
            if target.file_name().map(|f| f.to_string_lossy() == addr) != Some(true) {
                continue;
            }

            let path = format!("/dev/dri/{name}");
            let fd = self.open_path(&path)?;
            return Ok((fd, path));
        }

        Err(DrmError::DeviceNotFound {
            bus_id: bus_id.to_owned(),
        })
    }

    fn open_path(&mut self, path: &str) -> Result<DeviceFd, DrmError> {
        let cpath = CString::new(path).map_err(|_| DrmError::Open {
            path: path.to_owned(),
            errno: libc::EINVAL,
        })?;

        // SAFETY: cpath is a valid NUL-terminated string.
        let mut fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd == -1 && last_errno() == libc::EINVAL {
            // Pre-O_CLOEXEC kernel: open plainly, then mark the descriptor.
            fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
            if fd != -1 {
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFD);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
                    }
                }
            }
        }
        if fd == -1 {
            let errno = last_errno();
            warn!(path, errno, "device node open failed");
            return Err(DrmError::Open {
                path: path.to_owned(),
                errno,
            });
        }

        Ok(fd)
    }

    fn set_interface_version(
        &mut self,
        fd: DeviceFd,
        major: i32,
        minor: i32,
    ) -> Result<(), DrmError> {
        let mut sv = DrmSetVersion {
            drm_di_major: major,
            drm_di_minor: minor,
            drm_dd_major: -1,
            drm_dd_minor: -1,
        };
        self.drm_ioctl(
            fd,
            DRM_IOCTL_SET_VERSION,
            &mut sv as *mut DrmSetVersion as *mut libc::c_void,
            "DRM_IOCTL_SET_VERSION",
        )
    }

    fn set_master(&mut self, fd: DeviceFd) -> Result<(), DrmError> {
        self.drm_ioctl(
            fd,
            DRM_IOCTL_SET_MASTER,
            std::ptr::null_mut(),
            "DRM_IOCTL_SET_MASTER",
        )
    }

    fn drop_master(&mut self, fd: DeviceFd) -> Result<(), DrmError> {
        self.drm_ioctl(
            fd,
            DRM_IOCTL_DROP_MASTER,
            std::ptr::null_mut(),
            "DRM_IOCTL_DROP_MASTER",
        )
    }

    fn close(&mut self, fd: DeviceFd) {
        // SAFETY: fd came from our own open and is closed exactly once.
        unsafe {
            libc::close(fd);
        }
    }
}
