// External collaborator shim: enumerates attached devices and derives the
// host paths needed to open their photo catalogs.
//
// Device discovery and the mapping of a device uid to a human name are
// explicitly out of scope of the core design here; this module exists
// only so the crate is runnable end to end. It shells out to the
// `idevice_id`/`ideviceinfo` command-line tools the way the original
// program bound directly against `libimobiledevice` (device.c), which
// keeps the core crate free of an FFI dependency.

use std::path::PathBuf;
use std::process::Command;

use log::{error, warn};

use crate::constants::PHOTO_DB_RELATIVE_PATH;

/// One attached device, as reported by the device-discovery collaborator.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub uid: String,
    pub name: String,
}

impl DeviceInfo {
    /// GVFS exposes an AFC-mounted device under
    /// `/run/user/<uid>/gvfs/afc:host=<device-uid>/`.
    pub fn root_path(&self) -> PathBuf {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/gvfs/afc:host={}/", self.uid))
    }

    pub fn photo_db_path(&self) -> PathBuf {
        self.root_path().join(PHOTO_DB_RELATIVE_PATH)
    }
}

/// Lists every device currently reachable via `idevice_id`, resolving each
/// one's human name via `ideviceinfo`. Devices that fail lockdown (not
/// paired, locked, disconnected mid-enumeration) are skipped with a
/// warning rather than aborting the whole enumeration.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let uids = match list_device_uids() {
        Ok(uids) => uids,
        Err(err) => {
            error!("unable to list attached devices: {err}");
            return Vec::new();
        }
    };

    uids.into_iter()
        .filter_map(|uid| match device_name(&uid) {
            Ok(name) => Some(DeviceInfo { uid, name }),
            Err(err) => {
                warn!("skipping device {uid}: {err}");
                None
            }
        })
        .collect()
}

fn list_device_uids() -> anyhow::Result<Vec<String>> {
    let output = Command::new("idevice_id").arg("-l").output()?;
    if !output.status.success() {
        anyhow::bail!("idevice_id exited with {}", output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn device_name(uid: &str) -> anyhow::Result<String> {
    let output = Command::new("ideviceinfo")
        .args(["-u", uid, "-k", "DeviceName"])
        .output()?;
    if !output.status.success() {
        anyhow::bail!("ideviceinfo exited with {}", output.status);
    }

    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if name.is_empty() {
        anyhow::bail!("empty device name");
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_follows_gvfs_afc_convention() {
        let device = DeviceInfo {
            uid: "abc123".into(),
            name: "Test Phone".into(),
        };
        let root = device.root_path();
        let root_str = root.to_string_lossy();
        assert!(root_str.contains("gvfs/afc:host=abc123"));
    }

    #[test]
    fn photo_db_path_is_under_photodata() {
        let device = DeviceInfo {
            uid: "abc123".into(),
            name: "Test Phone".into(),
        };
        assert!(device
            .photo_db_path()
            .ends_with("PhotoData/Photos.sqlite"));
    }
}
