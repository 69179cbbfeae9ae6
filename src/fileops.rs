use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::config::ExtensionPriority;
use crate::db::models::ResolvedPath;
use crate::db::{Database, DbError};

/// Virtual directories have no mtime of their own; they all report the
/// moment the process came up.
static STARTUP_TIME: Lazy<SystemTime> = Lazy::new(SystemTime::now);

/// The one extended attribute the filesystem exposes: the backing file
/// behind a virtual file.
pub const REAL_PATH_XATTR: &str = "user.musicfs.real_path";

const DIR_MODE: u32 = 0o555;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("not a directory")]
    NotADirectory,
    #[error("bad file handle")]
    BadHandle,
    #[error("no such attribute")]
    NoData,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Store(#[from] DbError),
}

impl FsError {
    /// Errno a FUSE-like transport should report (positive value).
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EACCES,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::BadHandle => libc::EBADF,
            FsError::NoData => libc::ENODATA,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FsError::Store(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Stat-like view of a virtual path.
#[derive(Debug, Clone)]
pub struct Attributes {
    pub kind: FileKind,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// Answers filesystem requests against the materialized index. Read-only:
/// every operation that would write fails with permission denied before it
/// touches anything. The transport is expected to serialize calls.
pub struct FileOps {
    db: Database,
    preference: ExtensionPriority,
    handles: HashMap<u64, File>,
    next_handle: u64,
}

impl FileOps {
    pub fn new(db: Database, preference: ExtensionPriority) -> Self {
        Lazy::force(&STARTUP_TIME);
        Self {
            db,
            preference,
            handles: HashMap::new(),
            next_handle: 1,
        }
    }

    fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        self.db.get_real_path(path)?.ok_or(FsError::NotFound)
    }

    /// The root always exists; writes are always denied; executing a file
    /// is denied, traversing a directory is not.
    pub fn access(&self, path: &str, mode: i32) -> Result<()> {
        if mode & libc::W_OK != 0 {
            return Err(FsError::PermissionDenied);
        }
        if path == "/" {
            return Ok(());
        }
        let resolved = self.resolve(path)?;
        if !resolved.is_dir() && mode & libc::X_OK != 0 {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    /// Directories are synthesized (mode 0555, current uid/gid, startup
    /// timestamps); files pass the backing stat through with the write
    /// bits cleared.
    pub fn getattr(&self, path: &str) -> Result<Attributes> {
        if path == "/" {
            return Ok(Self::directory_attributes());
        }
        let resolved = self.resolve(path)?;
        let backing = match resolved.backing {
            Some(backing) => backing,
            None => return Ok(Self::directory_attributes()),
        };
        let meta = std::fs::metadata(&backing)?;
        Ok(Attributes {
            kind: FileKind::RegularFile,
            mode: meta.mode() & !0o222,
            nlink: 1,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len(),
            atime: system_time(meta.atime()),
            mtime: system_time(meta.mtime()),
            ctime: system_time(meta.ctime()),
        })
    }

    fn directory_attributes() -> Attributes {
        Attributes {
            kind: FileKind::Directory,
            mode: DIR_MODE,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            size: 0,
            atime: *STARTUP_TIME,
            mtime: *STARTUP_TIME,
            ctime: *STARTUP_TIME,
        }
    }

    /// The opaque directory handle is the path row id; the root uses 0.
    pub fn opendir(&self, path: &str) -> Result<u64> {
        if path == "/" {
            return Ok(0);
        }
        let resolved = self.resolve(path)?;
        if !resolved.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(resolved.id as u64)
    }

    /// `.` and `..`, then the children with same-track files collapsed to
    /// the preferred representation.
    pub fn readdir(&self, handle: u64) -> Result<Vec<String>> {
        let prefer = |a: &str, b: &str| self.preference.prefers(a, b);
        let children = self.db.get_children_of_path(handle as i64, &prefer)?;
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(children.into_iter().map(|child| basename(&child.path).to_string()));
        Ok(names)
    }

    /// Open the backing file read-only and hand out a handle for `read`.
    pub fn open(&mut self, path: &str) -> Result<u64> {
        let resolved = self.resolve(path)?;
        let backing = resolved.backing.ok_or(FsError::NotFound)?;
        let file = File::open(&backing)?;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, file);
        Ok(handle)
    }

    /// Positional pass-through read; short reads are legal.
    pub fn read(&self, handle: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        let file = self.handles.get(&handle).ok_or(FsError::BadHandle)?;
        let mut buf = vec![0u8; size];
        let n = file.read_at(&mut buf, offset)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn release(&mut self, handle: u64) -> Result<()> {
        self.handles
            .remove(&handle)
            .map(|_| ())
            .ok_or(FsError::BadHandle)
    }

    /// Files expose exactly one extended attribute; directories none.
    pub fn listxattr(&self, path: &str) -> Result<Vec<String>> {
        if path == "/" {
            return Ok(Vec::new());
        }
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            Ok(Vec::new())
        } else {
            Ok(vec![REAL_PATH_XATTR.to_string()])
        }
    }

    pub fn getxattr(&self, path: &str, name: &str) -> Result<Vec<u8>> {
        if name != REAL_PATH_XATTR || path == "/" {
            return Err(FsError::NoData);
        }
        let resolved = self.resolve(path)?;
        match resolved.backing {
            Some(backing) => Ok(backing.into_bytes()),
            None => Err(FsError::NoData),
        }
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
