// Constants describing the on-disk layout this crate expects and depends on.

/// The generic-asset table holding one row per photo/video.
pub const PHOTO_TABLE_NAME: &str = "ZGENERICASSET";

/// The table holding one row per album.
pub const ALBUM_TABLE_NAME: &str = "ZGENERICALBUM";

/// ZKIND value that marks an album as user-created (as opposed to smart
/// albums, favorites, and other built-in album kinds the device maintains).
pub const USER_ALBUM_KIND: i64 = 2;

/// Bound on the path resolver's cache.
pub const MAX_CACHE_SIZE: usize = 10_000;

/// Location of a device's photo database, relative to its GVFS root.
pub const PHOTO_DB_RELATIVE_PATH: &str = "PhotoData/Photos.sqlite";

/// Directory mode bits: owner read + execute only (`0500`).
pub const DIR_MODE: u32 = 0o500;

/// Regular file mode bits: owner read only (`0400`).
pub const FILE_MODE: u32 = 0o400;
