// The read-only FUSE adapter: translates getattr/readdir/open/read/release
// calls into resolver lookups and host file I/O.
//
// `fuser` exposes libfuse's low-level, inode-keyed operation set rather
// than the path-keyed `fuse_operations` table the rest of this crate is
// modelled on. `InodeTable` bridges the two: every path this process has
// ever handed an inode number to is remembered for the lifetime of the
// mount, so `getattr`/`open`/`read`/`release` (which only carry an inode)
// can still be serviced by resolving the path they were assigned for.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, Request,
};
use log::{error, warn};

use crate::constants::{DIR_MODE, FILE_MODE};
use crate::error::{PhotoFsError, Result};
use crate::registry::FilesystemRegistry;
use crate::resolver::{PathResolver, Resolution};

const ROOT_INODE: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

/// Enforces "at most one mount per process": a deliberate
/// concession to the FUSE ABI, which otherwise has no way to associate an
/// operation with "which filesystem instance" beyond the single global
/// table libfuse registers.
static CURRENT_MOUNT: Mutex<Option<Arc<FilesystemRegistry>>> = Mutex::new(None);

fn bind_current_mount(registry: Arc<FilesystemRegistry>) -> Result<()> {
    let mut guard = CURRENT_MOUNT.lock().unwrap();
    if guard.is_some() {
        return Err(PhotoFsError::InvalidArgument(
            "a filesystem is already mounted in this process".into(),
        ));
    }
    *guard = Some(registry);
    Ok(())
}

fn unbind_current_mount() {
    *CURRENT_MOUNT.lock().unwrap() = None;
}

struct InodeTable {
    path_by_inode: HashMap<u64, String>,
    inode_by_path: HashMap<String, u64>,
    next_inode: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut path_by_inode = HashMap::new();
        let mut inode_by_path = HashMap::new();
        path_by_inode.insert(ROOT_INODE, "/".to_string());
        inode_by_path.insert("/".to_string(), ROOT_INODE);

        Self {
            path_by_inode,
            inode_by_path,
            next_inode: ROOT_INODE + 1,
        }
    }

    fn inode_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inode_by_path.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_by_inode.insert(ino, path.to_string());
        self.inode_by_path.insert(path.to_string(), ino);
        ino
    }

    fn path_for(&self, inode: u64) -> Option<String> {
        self.path_by_inode.get(&inode).cloned()
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Builds a [`FileAttr`] by `stat`-ing a host path, then overwriting only
/// the kind/permission bits (the host file's own mode is not trusted —
/// this is a read-only view regardless of host permissions). Ownership
/// is taken from the host `stat()` result, not overridden.
fn attr_from_host_path(inode: u64, host_path: &Path, kind: FileType, perm: u16) -> Result<FileAttr> {
    let metadata = std::fs::metadata(host_path)?;
    Ok(FileAttr {
        ino: inode,
        size: metadata.len(),
        blocks: metadata.blocks(),
        atime: metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
        mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ctime: SystemTime::UNIX_EPOCH + Duration::from_secs(metadata.ctime() as u64),
        crtime: metadata.created().unwrap_or(SystemTime::UNIX_EPOCH),
        kind,
        perm,
        nlink: 1,
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: 0,
        blksize: 512,
        flags: 0,
    })
}

/// Synthetic attribute for the root and for any directory whose host path
/// could not be stat-ed (still validly resolved, just without real stat
/// data to overlay).
fn synthetic_dir_attr(inode: u64) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino: inode,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: DIR_MODE as u16,
        nlink: 2,
        uid: current_uid(),
        gid: current_gid(),
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

fn current_gid() -> u32 {
    unsafe { libc::getgid() }
}

fn errno_for(err: &PhotoFsError) -> i32 {
    match err {
        PhotoFsError::NotFound(_) => libc::ENOENT,
        PhotoFsError::InvalidArgument(_) => libc::EINVAL,
        PhotoFsError::DatabaseOpen(_)
        | PhotoFsError::Database(_)
        | PhotoFsError::SchemaUnknown(_)
        | PhotoFsError::SchemaAmbiguous(_) => libc::EIO,
        PhotoFsError::HostIo(io_err) => io_err.raw_os_error().unwrap_or(libc::EIO),
    }
}

/// A photo's open host file descriptor, keyed by the `fh` value handed
/// back to the kernel on `open` and presented again on `read`/`release`.
struct OpenFile {
    file: File,
}

/// The FUSE adapter: implements `getattr`, `readdir`, `open`,
/// `read`, and `release` against the [`PathResolver`].
pub struct PhotoFs {
    resolver: PathResolver,
    inodes: Mutex<InodeTable>,
    open_files: Mutex<HashMap<u64, OpenFile>>,
    next_fh: AtomicU64,
}

impl PhotoFs {
    fn new(registry: Arc<FilesystemRegistry>) -> Self {
        Self {
            resolver: PathResolver::new(registry),
            inodes: Mutex::new(InodeTable::new()),
            open_files: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    fn path_for_inode(&self, inode: u64) -> Option<String> {
        self.inodes.lock().unwrap().path_for(inode)
    }

    fn attr_for_resolution(&self, inode: u64, resolution: &Resolution) -> Result<FileAttr> {
        match resolution {
            Resolution::Root => Ok(synthetic_dir_attr(inode)),
            Resolution::Device(catalog) => {
                attr_from_host_path(inode, catalog.root_path(), FileType::Directory, DIR_MODE as u16)
                    .or_else(|_| Ok(synthetic_dir_attr(inode)))
            }
            Resolution::Album(catalog, _) => {
                attr_from_host_path(inode, catalog.root_path(), FileType::Directory, DIR_MODE as u16)
                    .or_else(|_| Ok(synthetic_dir_attr(inode)))
            }
            Resolution::Photo(catalog, _, photo) => {
                let host_path = catalog
                    .root_path()
                    .join(photo.location())
                    .join(photo.file_name());
                attr_from_host_path(inode, &host_path, FileType::RegularFile, FILE_MODE as u16)
            }
        }
    }
}

impl Filesystem for PhotoFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_inode(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };

        let child_path = join_path(&parent_path, name);
        match self.resolver.resolve(&child_path) {
            Ok(resolution) => {
                let inode = self.inodes.lock().unwrap().inode_for(&child_path);
                match self.attr_for_resolution(inode, &resolution) {
                    Ok(attr) => reply.entry(&TTL, &attr, 0),
                    Err(err) => reply.error(errno_for(&err)),
                }
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.resolver.resolve(&path) {
            Ok(resolution) => match self.attr_for_resolution(ino, &resolution) {
                Ok(attr) => reply.attr(&TTL, &attr),
                Err(err) => reply.error(errno_for(&err)),
            },
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let resolution = match self.resolver.resolve(&path) {
            Ok(resolution) => resolution,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let mut entries: Vec<(String, FileType)> = vec![
            (".".to_string(), FileType::Directory),
            ("..".to_string(), FileType::Directory),
        ];

        match &resolution {
            Resolution::Root => {
                // Names are collected up front (not streamed under the
                // registry's lock) since readdir's offset-resume contract
                // needs a stable ordering across calls.
                let mut names = Vec::new();
                self.resolver.registry().for_each(|name| names.push(name.to_string()));
                names.sort();
                entries.extend(names.into_iter().map(|n| (n, FileType::Directory)));
            }
            Resolution::Device(catalog) => {
                let mut names = Vec::new();
                catalog.for_each_album(|name, _| names.push(name.to_string()));
                names.sort();
                entries.extend(names.into_iter().map(|n| (n, FileType::Directory)));
            }
            Resolution::Album(_, album) => {
                let mut names = Vec::new();
                album.for_each(|photo| {
                    names.push(photo.file_name().to_string());
                    crate::album::Continue::Yes
                });
                names.sort();
                entries.extend(names.into_iter().map(|n| (n, FileType::RegularFile)));
            }
            Resolution::Photo(..) => {
                reply.error(libc::ENOTDIR);
                return;
            }
        }

        for (i, (name, kind)) in entries.into_iter().enumerate().skip(offset as usize) {
            let child_path = if name == "." {
                path.clone()
            } else if name == ".." {
                continue;
            } else {
                join_path(&path, &name)
            };
            let child_inode = self.inodes.lock().unwrap().inode_for(&child_path);
            if reply.add(child_inode, (i + 1) as i64, kind, &name) {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let resolution = match self.resolver.resolve(&path) {
            Ok(resolution) => resolution,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let Resolution::Photo(catalog, _, photo) = resolution else {
            // Opening a non-photo path leaves fi.fh unset and is reported
            // as a missing entry, not a directory-open error.
            reply.error(libc::ENOENT);
            return;
        };

        let host_path: PathBuf = catalog.root_path().join(photo.location()).join(photo.file_name());
        match File::open(&host_path) {
            Ok(file) => {
                let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
                self.open_files.lock().unwrap().insert(fh, OpenFile { file });
                reply.opened(fh, 0);
            }
            Err(err) => {
                error!("failed to open backing file {}: {err}", host_path.display());
                reply.error(err.raw_os_error().unwrap_or(libc::EIO));
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let open_files = self.open_files.lock().unwrap();
        let Some(open_file) = open_files.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };

        let mut buf = vec![0u8; size as usize];
        match open_file.file.read_at(&mut buf, offset as u64) {
            Ok(n) => {
                buf.truncate(n);
                reply.data(&buf);
            }
            Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if self.open_files.lock().unwrap().remove(&fh).is_none() {
            warn!("release called on unknown file handle {fh}");
        }
        reply.ok();
    }
}

/// Runs the photo filesystem. Blocks until the mount is unmounted (either
/// by the user running `umount`/`fusermount -u`, or by a terminating
/// signal).
pub fn run(registry: Arc<FilesystemRegistry>, mount_point: &Path) -> Result<()> {
    bind_current_mount(registry.clone())?;

    let options = vec![
        MountOption::RO,
        MountOption::FSName("devicefs".to_string()),
    ];
    let fs = PhotoFs::new(registry);
    let result = fuser::mount2(fs, mount_point, &options).map_err(PhotoFsError::HostIo);

    unbind_current_mount();
    result
}
