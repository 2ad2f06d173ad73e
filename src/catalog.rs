// Schema-adaptive extraction of a device's photo/album graph from its
// on-device SQLite catalog.
//
// The catalog's assets table name, and the two foreign-key columns inside
// it linking assets to albums and assets to their originating photo row,
// are not fixed across devices: they vary with the generation of the
// on-device database schema. This module probes for them instead of
// assuming fixed names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use rusqlite::{Connection, OpenFlags};

use crate::album::Album;
use crate::constants::{ALBUM_TABLE_NAME, PHOTO_TABLE_NAME, USER_ALBUM_KIND};
use crate::error::{PhotoFsError, Result};
use crate::photo::Photo;

/// The probed, device-specific schema names needed to join photos to
/// albums.
#[derive(Debug, Clone)]
struct ProbedSchema {
    assets_table_name: String,
    assets_album_fk: String,
    assets_photo_fk: String,
}

/// One device's in-memory album/photo graph, plus the schema names that
/// were needed to extract it.
///
/// Immutable and read-only after construction; shared via `Arc` by the
/// [`crate::registry::FilesystemRegistry`] and by any
/// [`crate::resolver::PathCacheEntry`] that references it.
#[derive(Debug)]
pub struct DeviceCatalog {
    device_name: String,
    root_path: PathBuf,
    albums: HashMap<String, Arc<Album>>,
    #[allow(dead_code)]
    schema: ProbedSchema,
}

impl DeviceCatalog {
    /// Opens `db_file_path` read-only, probes its schema, and loads the
    /// album/photo graph for every user-created album.
    pub fn open(
        db_file_path: impl AsRef<Path>,
        device_name: impl Into<String>,
        root_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let db_file_path = db_file_path.as_ref();
        let device_name = device_name.into();
        let root_path = root_path.into();

        if !db_file_path.exists() {
            return Err(PhotoFsError::NotFound(format!(
                "device database not reachable at {}",
                db_file_path.display()
            )));
        }

        debug!(
            "opening photo database for device '{}' at {}",
            device_name,
            db_file_path.display()
        );

        let conn = Connection::open_with_flags(db_file_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(PhotoFsError::DatabaseOpen)?;

        let schema = probe_schema(&conn)?;
        debug!(
            "device '{}': assets table = {}, album fk = {}, photo fk = {}",
            device_name, schema.assets_table_name, schema.assets_album_fk, schema.assets_photo_fk
        );

        let albums = extract_albums(&conn, &schema)?;

        Ok(Self {
            device_name,
            root_path,
            albums,
            schema,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn get_album_by_name(&self, name: &str) -> Result<Arc<Album>> {
        self.albums
            .get(name)
            .cloned()
            .ok_or_else(|| PhotoFsError::NotFound(format!("album '{name}'")))
    }

    pub fn for_each_album<F>(&self, mut callback: F)
    where
        F: FnMut(&str, &Arc<Album>),
    {
        for (name, album) in &self.albums {
            callback(name, album);
        }
    }

    pub fn album_count(&self) -> usize {
        self.albums.len()
    }
}

/// Steps 2 and 3 of the construction protocol: discover the assets table,
/// then the album/photo foreign-key column names inside it.
fn probe_schema(conn: &Connection) -> Result<ProbedSchema> {
    let assets_table_name = discover_assets_table(conn)?;
    let (assets_album_fk, assets_photo_fk) = discover_foreign_keys(conn, &assets_table_name)?;

    Ok(ProbedSchema {
        assets_table_name,
        assets_album_fk,
        assets_photo_fk,
    })
}

fn discover_assets_table(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare(
        "select name from sqlite_master where type='table' and name like '%ASSETS'",
    )?;

    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<_, _>>()?;

    match names.len() {
        0 => Err(PhotoFsError::SchemaUnknown(
            "no table ending in ASSETS found in sqlite_master".into(),
        )),
        1 => Ok(names.into_iter().next().unwrap()),
        _ => Err(PhotoFsError::SchemaAmbiguous(format!(
            "multiple candidate assets tables found: {}",
            names.join(", ")
        ))),
    }
}

/// Scans `pragma table_info(<assets_table>)` in column order, adopting the
/// first column matching each rule.
fn discover_foreign_keys(conn: &Connection, assets_table: &str) -> Result<(String, String)> {
    let mut stmt = conn.prepare(&format!("pragma table_info('{assets_table}')"))?;

    let mut album_fk: Option<String> = None;
    let mut photo_fk: Option<String> = None;

    let column_names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<_, _>>()?;

    for column_name in column_names {
        if album_fk.is_none() && column_name.contains("ALBUMS") {
            album_fk = Some(column_name);
            continue;
        }
        if photo_fk.is_none() && column_name.contains("ASSETS") && !column_name.contains("FOK") {
            photo_fk = Some(column_name);
        }
    }

    match (album_fk, photo_fk) {
        (Some(album_fk), Some(photo_fk)) => Ok((album_fk, photo_fk)),
        _ => Err(PhotoFsError::SchemaUnknown(format!(
            "unable to locate both album and photo foreign keys in table '{assets_table}'"
        ))),
    }
}

/// Step 4 of the construction protocol: join photos to their user-created
/// albums and build the in-memory graph.
fn extract_albums(conn: &Connection, schema: &ProbedSchema) -> Result<HashMap<String, Arc<Album>>> {
    let query = format!(
        "select P.ZFILENAME, P.ZDIRECTORY, A.ZTITLE \
         from {photo_table} P \
         inner join {assets_table} X on P.Z_PK = X.{photo_fk} \
         inner join {album_table} A on X.{album_fk} = A.Z_PK \
         where A.ZKIND = {user_kind}",
        photo_table = PHOTO_TABLE_NAME,
        assets_table = schema.assets_table_name,
        photo_fk = schema.assets_photo_fk,
        album_table = ALBUM_TABLE_NAME,
        album_fk = schema.assets_album_fk,
        user_kind = USER_ALBUM_KIND,
    );

    let mut stmt = conn.prepare(&query)?;
    let rows: Vec<(String, String, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;

    let mut albums: HashMap<String, Album> = HashMap::new();

    for (file_name, directory, album_title) in rows {
        let photo = match Photo::new(file_name, directory) {
            Ok(photo) => photo,
            Err(err) => {
                warn!("skipping malformed photo row: {err}");
                continue;
            }
        };

        if !albums.contains_key(&album_title) {
            albums.insert(album_title.clone(), Album::new(album_title.clone())?);
        }
        let album = albums.get_mut(&album_title).unwrap();
        album.add(photo);
    }

    Ok(albums
        .into_iter()
        .map(|(name, album)| (name, Arc::new(album)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    /// Builds a throwaway catalog that mirrors a real schema-drift case
    /// seen in the wild: the assets table is named `Z_43ASSETS`, and
    /// its columns include a decoy foreign key containing `FOK`.
    fn build_fixture_db() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();

        conn.execute_batch(
            "
            CREATE TABLE ZGENERICASSET (Z_PK INTEGER PRIMARY KEY, ZFILENAME TEXT, ZDIRECTORY TEXT);
            CREATE TABLE ZGENERICALBUM (Z_PK INTEGER PRIMARY KEY, ZTITLE TEXT, ZKIND INTEGER);
            CREATE TABLE Z_43ASSETS (
                Z_43ALBUMS INTEGER,
                Z_43ASSETS INTEGER,
                Z_FOK_43ASSETS INTEGER
            );

            INSERT INTO ZGENERICALBUM (Z_PK, ZTITLE, ZKIND) VALUES (1, 'Vacation', 2);
            INSERT INTO ZGENERICALBUM (Z_PK, ZTITLE, ZKIND) VALUES (2, 'Hidden', 99);

            INSERT INTO ZGENERICASSET (Z_PK, ZFILENAME, ZDIRECTORY) VALUES (10, 'a.jpg', 'DCIM/100APPLE');
            INSERT INTO ZGENERICASSET (Z_PK, ZFILENAME, ZDIRECTORY) VALUES (11, 'b.jpg', 'DCIM/100APPLE');
            INSERT INTO ZGENERICASSET (Z_PK, ZFILENAME, ZDIRECTORY) VALUES (12, 'x.jpg', 'DCIM/999HIDE');

            INSERT INTO Z_43ASSETS (Z_43ALBUMS, Z_43ASSETS, Z_FOK_43ASSETS) VALUES (1, 10, 999);
            INSERT INTO Z_43ASSETS (Z_43ALBUMS, Z_43ASSETS, Z_FOK_43ASSETS) VALUES (1, 11, 999);
            INSERT INTO Z_43ASSETS (Z_43ALBUMS, Z_43ASSETS, Z_FOK_43ASSETS) VALUES (2, 12, 999);
            ",
        )
        .unwrap();

        file
    }

    #[test]
    fn probes_schema_names_skipping_fok_column() {
        let file = build_fixture_db();
        let conn = Connection::open(file.path()).unwrap();
        let schema = probe_schema(&conn).unwrap();

        assert_eq!(schema.assets_table_name, "Z_43ASSETS");
        assert_eq!(schema.assets_album_fk, "Z_43ALBUMS");
        assert_eq!(schema.assets_photo_fk, "Z_43ASSETS");
    }

    #[test]
    fn loads_only_user_created_albums() {
        let file = build_fixture_db();
        let catalog = DeviceCatalog::open(file.path(), "Phone", "/run/user/1000/gvfs/afc").unwrap();

        assert_eq!(catalog.album_count(), 1);
        let vacation = catalog.get_album_by_name("Vacation").unwrap();
        assert_eq!(vacation.len(), 2);
        assert!(catalog.get_album_by_name("Hidden").is_err());
    }

    #[test]
    fn missing_database_file_is_not_found() {
        let err = DeviceCatalog::open("/no/such/path.sqlite", "Phone", "/root").unwrap_err();
        assert!(matches!(err, PhotoFsError::NotFound(_)));
    }

    #[test]
    fn ambiguous_assets_table_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE Z_1ASSETS (a INTEGER);
             CREATE TABLE Z_2ASSETS (a INTEGER);",
        )
        .unwrap();

        let err = probe_schema(&conn).unwrap_err();
        assert!(matches!(err, PhotoFsError::SchemaAmbiguous(_)));
    }

    #[test]
    fn missing_assets_table_is_schema_unknown() {
        let file = NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        let err = probe_schema(&conn).unwrap_err();
        assert!(matches!(err, PhotoFsError::SchemaUnknown(_)));
    }
}
