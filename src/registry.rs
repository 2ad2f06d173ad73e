// The set of loaded device catalogs, keyed by a uniqueness-enforced
// display name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::DeviceCatalog;
use crate::error::{PhotoFsError, Result};

/// Holds every mounted device's catalog under a display name that is
/// guaranteed unique within this registry.
///
/// Frozen once serving begins: no mutation occurs while the filesystem
/// adapter is running, so reads during serving require no additional
/// synchronisation beyond the happens-before established at startup.
#[derive(Debug, Default)]
pub struct FilesystemRegistry {
    devices: HashMap<String, Arc<DeviceCatalog>>,
}

impl FilesystemRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
        }
    }

    /// Admits `catalog` under its device name, suffixing with `" (<n>)"`
    /// starting at `n = 2` until a free key is found if that name is
    /// already taken.
    pub fn add_database(&mut self, catalog: DeviceCatalog) {
        let base_name = catalog.device_name().to_string();
        let mut candidate = base_name.clone();

        if self.devices.contains_key(&candidate) {
            let mut suffix = 2u32;
            loop {
                candidate = format!("{base_name} ({suffix})");
                if !self.devices.contains_key(&candidate) {
                    break;
                }
                suffix += 1;
            }
        }

        self.devices.insert(candidate, Arc::new(catalog));
    }

    pub fn get_by_fs_name(&self, name: &str) -> Result<Arc<DeviceCatalog>> {
        self.devices
            .get(name)
            .cloned()
            .ok_or_else(|| PhotoFsError::NotFound(format!("device '{name}'")))
    }

    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(&str),
    {
        for name in self.devices.keys() {
            callback(name);
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal on-disk catalog fixture; the registry only cares about
    /// `device_name()`, so the album/photo contents are incidental.
    fn sqlite_catalog(device_name: &str) -> DeviceCatalog {
        use rusqlite::Connection;
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE ZGENERICASSET (Z_PK INTEGER PRIMARY KEY, ZFILENAME TEXT, ZDIRECTORY TEXT);
             CREATE TABLE ZGENERICALBUM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT, ZKIND INTEGER);
             CREATE TABLE Z_1ASSETS (Z_1ALBUMS INTEGER, Z_1ASSETS INTEGER);
             INSERT INTO ZGENERICALBUM VALUES (1, 'Vacation', 2);
             INSERT INTO ZGENERICASSET VALUES (10, 'a.jpg', 'DCIM');
             INSERT INTO Z_1ASSETS VALUES (1, 10);",
        )
        .unwrap();
        drop(conn);

        DeviceCatalog::open(file.path(), device_name, "/root").unwrap()
    }

    #[test]
    fn first_registration_keeps_plain_name() {
        let mut registry = FilesystemRegistry::new();
        registry.add_database(sqlite_catalog("Phone"));

        assert!(registry.get_by_fs_name("Phone").is_ok());
    }

    #[test]
    fn colliding_names_get_suffixed_starting_at_two() {
        let mut registry = FilesystemRegistry::new();
        registry.add_database(sqlite_catalog("Phone"));
        registry.add_database(sqlite_catalog("Phone"));

        assert!(registry.get_by_fs_name("Phone").is_ok());
        assert!(registry.get_by_fs_name("Phone (2)").is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn three_colliding_names_increment_past_two() {
        let mut registry = FilesystemRegistry::new();
        registry.add_database(sqlite_catalog("Phone"));
        registry.add_database(sqlite_catalog("Phone"));
        registry.add_database(sqlite_catalog("Phone"));

        assert!(registry.get_by_fs_name("Phone").is_ok());
        assert!(registry.get_by_fs_name("Phone (2)").is_ok());
        assert!(registry.get_by_fs_name("Phone (3)").is_ok());
    }

    #[test]
    fn unknown_device_is_not_found() {
        let registry = FilesystemRegistry::new();
        assert!(registry.get_by_fs_name("Nope").is_err());
    }
}
