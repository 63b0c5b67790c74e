//! Local filesystem adapters for the ingestion traits.
//!
//! `LocalFile` plays the part of a picker selection, `LocalEntry` the part of
//! a dropped file or folder.

use crate::ingest::{
    DirectoryEntry, DirectoryReader, FileEntry, FileSource, FilesystemEntry, SourceFile,
};
use async_trait::async_trait;
use shared::error::IngestError;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Children handed out per `read_entries` call.
const LISTING_BATCH_SIZE: usize = 100;

fn read_error(path: &Path, source: io::Error) -> IngestError {
    IngestError::Read {
        path: path.display().to_string(),
        source,
    }
}

fn enumeration_error(path: &Path, source: io::Error) -> IngestError {
    IngestError::Enumeration {
        path: path.display().to_string(),
        source,
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Name shown for a picked or dropped root: its own last component, or the
/// canonical one for paths like `.` that have none.
fn display_name(path: &Path, canonical: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => file_name_of(canonical),
    }
}

/// A file on disk.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    relative: Option<String>,
    size: u64,
}

impl LocalFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| read_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            name: file_name_of(path),
            relative: None,
            size: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every file below `root`, with paths relative to the folder's parent
    /// (`root-name/sub/file.ext`), depth first in name order. Symlinked
    /// directories are not followed.
    pub async fn picked_folder(root: &Path) -> Result<Vec<LocalFile>, IngestError> {
        let canonical = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| enumeration_error(root, e))?;
        let root_name = display_name(root, &canonical);
        let walk_root = canonical.clone();
        tokio::task::spawn_blocking(move || walk_folder(&walk_root, root_name))
            .await
            .map_err(|e| enumeration_error(&canonical, io::Error::other(e.to_string())))?
    }

    /// Build a picker source from paths: files are taken as-is, folders are
    /// expanded like a folder picker. Missing paths are skipped.
    pub async fn pick(paths: &[PathBuf]) -> Result<FileSource, IngestError> {
        let mut picked: Vec<Arc<dyn SourceFile>> = Vec::new();
        for path in paths {
            let meta = match tokio::fs::metadata(path).await {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open picked path");
                    continue;
                }
            };
            if meta.is_dir() {
                for file in Self::picked_folder(path).await? {
                    picked.push(Arc::new(file));
                }
            } else {
                picked.push(Arc::new(LocalFile {
                    path: path.clone(),
                    name: file_name_of(path),
                    relative: None,
                    size: meta.len(),
                }));
            }
        }
        Ok(FileSource::Files(picked))
    }
}

fn walk_folder(root: &Path, root_name: String) -> Result<Vec<LocalFile>, IngestError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("directory walk failed"));
            enumeration_error(&path, source)
        })?;

        let file_type = entry.file_type();
        let size = if file_type.is_file() {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        } else if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => {
                    debug!(path = %entry.path().display(), "skipping symlink");
                    continue;
                }
            }
        } else {
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .fold(root_name.clone(), |acc, part| format!("{}/{}", acc, part));
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            name: file_name_of(entry.path()),
            relative: Some(relative),
            size,
        });
    }
    Ok(files)
}

#[async_trait]
impl SourceFile for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn relative_path(&self) -> Option<&str> {
        self.relative.as_deref()
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn text(&self) -> Result<String, IngestError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| read_error(&self.path, e))?;
        String::from_utf8(bytes).map_err(|_| IngestError::Decode {
            path: self.path.display().to_string(),
        })
    }
}

enum ChildKind {
    Dir,
    File,
}

/// List a directory sorted by name. Symlinks to files are kept, symlinks to
/// directories and dangling links are skipped.
async fn list_sorted(dir: &Path) -> Result<Vec<(PathBuf, ChildKind)>, IngestError> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| enumeration_error(dir, e))?;
    let mut children = Vec::new();

    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| enumeration_error(dir, e))?
    {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat entry");
                continue;
            }
        };

        if file_type.is_dir() {
            children.push((path, ChildKind::Dir));
        } else if file_type.is_file() {
            children.push((path, ChildKind::File));
        } else if file_type.is_symlink() {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => children.push((path, ChildKind::File)),
                _ => debug!(path = %path.display(), "skipping symlink"),
            }
        }
    }

    children.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(children)
}

/// Dropped files and folders on disk.
pub struct LocalEntry;

impl LocalEntry {
    /// Resolve a dropped path into an entry rooted at its own name
    /// (`/name`, `/name/child`, ...). Paths without a final name such as `.`
    /// are rooted at the canonical directory name.
    pub async fn from_path(path: &Path) -> Result<FilesystemEntry, IngestError> {
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| read_error(path, e))?;
        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| read_error(&canonical, e))?;
        let full_path = format!("/{}", display_name(path, &canonical));
        let path = canonical;
        Ok(if meta.is_dir() {
            FilesystemEntry::Directory(Arc::new(LocalDirEntry { path, full_path }))
        } else {
            FilesystemEntry::File(Arc::new(LocalFileEntry { path, full_path }))
        })
    }

    /// Build a drop source from paths. Paths that no longer exist are skipped.
    pub async fn from_drop(paths: &[PathBuf]) -> FileSource {
        let mut roots = Vec::new();
        for path in paths {
            match Self::from_path(path).await {
                Ok(entry) => roots.push(entry),
                Err(e) => warn!(error = %e, "ignoring dropped path"),
            }
        }
        FileSource::Entries(roots)
    }
}

struct LocalFileEntry {
    path: PathBuf,
    full_path: String,
}

#[async_trait]
impl FileEntry for LocalFileEntry {
    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn node_id(&self) -> String {
        self.path.display().to_string()
    }

    async fn file(&self) -> Result<Arc<dyn SourceFile>, IngestError> {
        Ok(Arc::new(LocalFile::open(&self.path).await?))
    }
}

struct LocalDirEntry {
    path: PathBuf,
    full_path: String,
}

impl DirectoryEntry for LocalDirEntry {
    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn node_id(&self) -> String {
        self.path.display().to_string()
    }

    fn create_reader(&self) -> Box<dyn DirectoryReader> {
        Box::new(LocalDirReader {
            path: self.path.clone(),
            full_path: self.full_path.clone(),
            pending: None,
        })
    }
}

struct LocalDirReader {
    path: PathBuf,
    full_path: String,
    pending: Option<VecDeque<FilesystemEntry>>,
}

#[async_trait]
impl DirectoryReader for LocalDirReader {
    async fn read_entries(&mut self) -> Result<Vec<FilesystemEntry>, IngestError> {
        if self.pending.is_none() {
            let children = list_sorted(&self.path).await?;
            let entries: VecDeque<FilesystemEntry> = children
                .into_iter()
                .map(|(path, kind)| {
                    let full_path = format!("{}/{}", self.full_path, file_name_of(&path));
                    match kind {
                        ChildKind::Dir => {
                            FilesystemEntry::Directory(Arc::new(LocalDirEntry { path, full_path }))
                        }
                        ChildKind::File => {
                            FilesystemEntry::File(Arc::new(LocalFileEntry { path, full_path }))
                        }
                    }
                })
                .collect();
            self.pending = Some(entries);
        }

        let pending = self.pending.get_or_insert_with(VecDeque::new);
        let n = LISTING_BATCH_SIZE.min(pending.len());
        Ok(pending.drain(..n).collect())
    }
}
