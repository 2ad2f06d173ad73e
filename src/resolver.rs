// Parses a `/device[/album[/photo]]` path, resolves each level against the
// registry, and caches the result.

use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::album::Album;
use crate::catalog::DeviceCatalog;
use crate::constants::MAX_CACHE_SIZE;
use crate::error::{PhotoFsError, Result};
use crate::photo::Photo;
use crate::registry::FilesystemRegistry;

/// The outcome of resolving a path, naming exactly the entities at and
/// above the deepest component present.
///
/// This stands in for the four-callback bundle from the original design:
/// the resolver returns one of these instead of invoking a
/// caller-supplied function pointer, and callers `match` on it.
#[derive(Debug, Clone)]
pub enum Resolution {
    Root,
    Device(Arc<DeviceCatalog>),
    Album(Arc<DeviceCatalog>, Arc<Album>),
    Photo(Arc<DeviceCatalog>, Arc<Album>, Arc<Photo>),
}

#[derive(Debug, Clone)]
enum PathCacheEntry {
    Device(Arc<DeviceCatalog>),
    Album(Arc<DeviceCatalog>, Arc<Album>),
    Photo(Arc<DeviceCatalog>, Arc<Album>, Arc<Photo>),
}

impl From<&PathCacheEntry> for Resolution {
    fn from(entry: &PathCacheEntry) -> Self {
        match entry {
            PathCacheEntry::Device(d) => Resolution::Device(d.clone()),
            PathCacheEntry::Album(d, a) => Resolution::Album(d.clone(), a.clone()),
            PathCacheEntry::Photo(d, a, p) => Resolution::Photo(d.clone(), a.clone(), p.clone()),
        }
    }
}

struct Cache {
    entries: std::collections::HashMap<String, PathCacheEntry>,
}

impl Cache {
    fn new() -> Self {
        Self {
            entries: std::collections::HashMap::new(),
        }
    }

    /// Inserts `entry` under `path`, evicting a uniformly-random existing
    /// entry first if the cache is already at capacity.
    fn insert(&mut self, path: String, entry: PathCacheEntry) {
        if self.entries.len() >= MAX_CACHE_SIZE && !self.entries.contains_key(&path) {
            let victim_index = rand::thread_rng().gen_range(0..self.entries.len());
            let victim_key = self
                .entries
                .keys()
                .nth(victim_index)
                .expect("cache is non-empty at capacity")
                .clone();
            self.entries.remove(&victim_key);
        }
        self.entries.insert(path, entry);
    }

    fn get(&self, path: &str) -> Option<&PathCacheEntry> {
        self.entries.get(path)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Resolves filesystem paths against a [`FilesystemRegistry`], backed by a
/// bounded cache of previously-resolved paths.
pub struct PathResolver {
    registry: Arc<FilesystemRegistry>,
    cache: Mutex<Cache>,
}

impl PathResolver {
    pub fn new(registry: Arc<FilesystemRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(Cache::new()),
        }
    }

    /// Number of entries currently held in the cache. Exposed for tests.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn registry(&self) -> &FilesystemRegistry {
        &self.registry
    }

    /// Resolves `path`, which must start with `/` (the documented
    /// `path[0] != '/'` precondition in the original design was a bug; the
    /// intent, and the contract honoured here, is the opposite).
    pub fn resolve(&self, path: &str) -> Result<Resolution> {
        if !path.starts_with('/') {
            return Err(PhotoFsError::InvalidArgument(
                "path must be absolute".into(),
            ));
        }

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(path) {
                return Ok(Resolution::from(entry));
            }
        }

        if path == "/" {
            return Ok(Resolution::Root);
        }

        let remainder = &path[1..];
        if remainder.is_empty() {
            return Err(PhotoFsError::NotFound(path.to_string()));
        }

        let (device_name, rest) = split_first_component(remainder);
        if device_name.is_empty() {
            return Err(PhotoFsError::NotFound(path.to_string()));
        }

        let catalog = self.registry.get_by_fs_name(device_name)?;

        let Some(rest) = rest else {
            let entry = PathCacheEntry::Device(catalog.clone());
            self.cache.lock().unwrap().insert(path.to_string(), entry);
            return Ok(Resolution::Device(catalog));
        };

        let (album_name, rest) = split_first_component(rest);
        if album_name.is_empty() {
            return Err(PhotoFsError::NotFound(path.to_string()));
        }

        let album = catalog.get_album_by_name(album_name)?;

        let Some(photo_name) = rest else {
            let entry = PathCacheEntry::Album(catalog.clone(), album.clone());
            self.cache.lock().unwrap().insert(path.to_string(), entry);
            return Ok(Resolution::Album(catalog, album));
        };

        // File names may not contain '/': no further splitting.
        let photo = album.get_by_file_name(photo_name)?;

        let entry = PathCacheEntry::Photo(catalog.clone(), album.clone(), photo.clone());
        self.cache.lock().unwrap().insert(path.to_string(), entry);
        Ok(Resolution::Photo(catalog, album, photo))
    }
}

/// Splits `s` at its first `/`, returning the part before it and, if a `/`
/// was found, everything after it (which may itself be empty).
fn split_first_component(s: &str) -> (&str, Option<&str>) {
    match s.find('/') {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn registry_with_one_device() -> Arc<FilesystemRegistry> {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE ZGENERICASSET (Z_PK INTEGER PRIMARY KEY, ZFILENAME TEXT, ZDIRECTORY TEXT);
             CREATE TABLE ZGENERICALBUM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT, ZKIND INTEGER);
             CREATE TABLE Z_1ASSETS (Z_1ALBUMS INTEGER, Z_1ASSETS INTEGER);
             INSERT INTO ZGENERICALBUM VALUES (1, 'Vacation', 2);
             INSERT INTO ZGENERICASSET VALUES (10, 'a.jpg', 'DCIM');
             INSERT INTO ZGENERICASSET VALUES (11, 'b.jpg', 'DCIM');
             INSERT INTO Z_1ASSETS VALUES (1, 10);
             INSERT INTO Z_1ASSETS VALUES (1, 11);",
        )
        .unwrap();
        drop(conn);

        let catalog = DeviceCatalog::open(file.path(), "Phone", "/root").unwrap();
        let mut registry = FilesystemRegistry::new();
        registry.add_database(catalog);
        Arc::new(registry)
    }

    #[test]
    fn resolves_root() {
        let resolver = PathResolver::new(registry_with_one_device());
        assert!(matches!(resolver.resolve("/").unwrap(), Resolution::Root));
    }

    #[test]
    fn resolves_device_album_and_photo() {
        let resolver = PathResolver::new(registry_with_one_device());

        assert!(matches!(
            resolver.resolve("/Phone").unwrap(),
            Resolution::Device(_)
        ));
        assert!(matches!(
            resolver.resolve("/Phone/Vacation").unwrap(),
            Resolution::Album(_, _)
        ));
        assert!(matches!(
            resolver.resolve("/Phone/Vacation/a.jpg").unwrap(),
            Resolution::Photo(_, _, _)
        ));
    }

    #[test]
    fn unknown_device_is_not_found() {
        let resolver = PathResolver::new(registry_with_one_device());
        assert!(resolver.resolve("/NoSuchDevice").is_err());
    }

    #[test]
    fn unknown_album_is_not_found() {
        let resolver = PathResolver::new(registry_with_one_device());
        assert!(resolver.resolve("/Phone/NoSuchAlbum").is_err());
    }

    #[test]
    fn relative_path_is_rejected() {
        let resolver = PathResolver::new(registry_with_one_device());
        assert!(resolver.resolve("Phone").is_err());
    }

    #[test]
    fn repeated_resolution_hits_cache_without_growing_it() {
        let resolver = PathResolver::new(registry_with_one_device());

        resolver.resolve("/Phone/Vacation/a.jpg").unwrap();
        let len_after_first = resolver.cache_len();

        resolver.resolve("/Phone/Vacation/a.jpg").unwrap();
        assert_eq!(resolver.cache_len(), len_after_first);
    }

    #[test]
    fn cache_never_exceeds_its_bound() {
        let resolver = PathResolver::new(registry_with_one_device());
        for _ in 0..20 {
            resolver.resolve("/Phone/Vacation/a.jpg").unwrap();
            resolver.resolve("/Phone/Vacation/b.jpg").unwrap();
            resolver.resolve("/Phone/Vacation").unwrap();
            resolver.resolve("/Phone").unwrap();
        }
        assert!(resolver.cache_len() <= MAX_CACHE_SIZE);
    }
}
