//! Directory ingestion.
//!
//! Normalizes picker selections and drag-and-drop entry trees into
//! [`FileRecord`]s. Directory trees are expanded concurrently, candidates are
//! filtered by extension and size, and surviving files are read with a bounded
//! number of reads in flight. Output order always follows discovery order,
//! never completion order.

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use shared::error::IngestError;
use shared::files::{base_name, is_allowed_extension, FileRecord, MAX_FILE_SIZE};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A readable file handle, as handed out by a picker or resolved from a file entry.
#[async_trait]
pub trait SourceFile: Send + Sync {
    /// Base file name
    fn name(&self) -> &str;

    /// Path relative to a picked folder, when the file came from one.
    fn relative_path(&self) -> Option<&str> {
        None
    }

    /// Size in bytes as reported before reading
    fn size(&self) -> u64;

    /// Read and decode the whole file as text.
    async fn text(&self) -> Result<String, IngestError>;
}

/// File node of a dropped tree.
#[async_trait]
pub trait FileEntry: Send + Sync {
    /// Path from the drop root, usually starting with `/`. Only used for
    /// display and record paths; two nodes may share one.
    fn full_path(&self) -> &str;

    /// Identity of the underlying node. Defaults to the entry's address, so
    /// clones of one `Arc` are the same node.
    fn node_id(&self) -> String {
        format!("{:p}", self)
    }

    async fn file(&self) -> Result<Arc<dyn SourceFile>, IngestError>;
}

/// Directory node of a dropped tree.
pub trait DirectoryEntry: Send + Sync {
    fn full_path(&self) -> &str;

    /// Identity of the underlying node, as for [`FileEntry::node_id`].
    fn node_id(&self) -> String {
        format!("{:p}", self)
    }

    fn create_reader(&self) -> Box<dyn DirectoryReader>;
}

/// Lists a directory's children in batches.
#[async_trait]
pub trait DirectoryReader: Send {
    /// Next batch of children. An empty batch means the listing is complete.
    async fn read_entries(&mut self) -> Result<Vec<FilesystemEntry>, IngestError>;
}

/// A node in a dropped file/directory tree.
#[derive(Clone)]
pub enum FilesystemEntry {
    File(Arc<dyn FileEntry>),
    Directory(Arc<dyn DirectoryEntry>),
}

impl FilesystemEntry {
    pub fn full_path(&self) -> &str {
        match self {
            FilesystemEntry::File(f) => f.full_path(),
            FilesystemEntry::Directory(d) => d.full_path(),
        }
    }

    pub fn node_id(&self) -> String {
        match self {
            FilesystemEntry::File(f) => f.node_id(),
            FilesystemEntry::Directory(d) => d.node_id(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FilesystemEntry::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, FilesystemEntry::Directory(_))
    }
}

/// One batch of user input.
pub enum FileSource {
    /// Flat selection: file picker, folder picker or loose dragged files
    Files(Vec<Arc<dyn SourceFile>>),
    /// Roots resolved from a drop
    Entries(Vec<FilesystemEntry>),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Files of this size or larger are skipped
    pub max_file_size: u64,
    /// Upper bound on concurrent reads
    pub max_in_flight: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_in_flight: 16,
        }
    }
}

struct Candidate {
    file: Arc<dyn SourceFile>,
    path: String,
}

impl Candidate {
    fn from_picked(file: Arc<dyn SourceFile>) -> Self {
        let path = file
            .relative_path()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| file.name())
            .to_string();
        Self { file, path }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Turn sources into records, in the order files were discovered.
    ///
    /// Fails only when a dropped directory cannot be listed. Files that are
    /// filtered out or cannot be read are left out of the result.
    pub async fn ingest(&self, sources: Vec<FileSource>) -> Result<Vec<FileRecord>, IngestError> {
        let mut candidates = Vec::new();
        for source in sources {
            match source {
                FileSource::Files(files) => {
                    candidates.extend(files.into_iter().map(Candidate::from_picked));
                }
                FileSource::Entries(roots) => {
                    candidates.extend(expand_roots(&roots).await?);
                }
            }
        }

        let discovered = candidates.len();
        let accepted: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| self.accepts(c))
            .collect();

        let records: Vec<FileRecord> = stream::iter(accepted)
            .map(read_candidate)
            .buffered(self.options.max_in_flight.max(1))
            .filter_map(future::ready)
            .collect()
            .await;

        info!(
            discovered,
            ingested = records.len(),
            "file ingestion finished"
        );
        Ok(records)
    }

    fn accepts(&self, candidate: &Candidate) -> bool {
        let name = candidate.file.name();
        if !is_allowed_extension(name) {
            debug!(path = %candidate.path, "skipping file: extension not allowed");
            return false;
        }
        let size = candidate.file.size();
        if size >= self.options.max_file_size {
            debug!(path = %candidate.path, size, "skipping file: too large");
            return false;
        }
        true
    }
}

async fn read_candidate(candidate: Candidate) -> Option<FileRecord> {
    match candidate.file.text().await {
        Ok(content) => Some(FileRecord {
            name: candidate.file.name().to_string(),
            path: candidate.path,
            size: content.len() as u64,
            content,
        }),
        Err(e) => {
            warn!(path = %candidate.path, error = %e, "dropping unreadable file");
            None
        }
    }
}

async fn expand_roots(roots: &[FilesystemEntry]) -> Result<Vec<Candidate>, IngestError> {
    let visited = Mutex::new(HashSet::new());
    let subtrees = future::try_join_all(roots.iter().map(|root| expand(root, &visited))).await?;
    Ok(subtrees.into_iter().flatten().collect())
}

fn expand<'a>(
    entry: &'a FilesystemEntry,
    visited: &'a Mutex<HashSet<String>>,
) -> BoxFuture<'a, Result<Vec<Candidate>, IngestError>> {
    async move {
        let first_visit = visited.lock().insert(entry.node_id());
        if !first_visit {
            debug!(path = entry.full_path(), "entry already visited");
            return Ok(Vec::new());
        }

        match entry {
            FilesystemEntry::File(file_entry) => match file_entry.file().await {
                Ok(file) => {
                    let path = drop_path(file_entry.full_path(), file.name());
                    Ok(vec![Candidate { file, path }])
                }
                Err(e) => {
                    warn!(path = file_entry.full_path(), error = %e, "could not open dropped file");
                    Ok(Vec::new())
                }
            },
            FilesystemEntry::Directory(dir) => {
                let children = read_all_entries(dir.as_ref()).await?;
                let nested =
                    future::try_join_all(children.iter().map(|child| expand(child, visited)))
                        .await?;
                Ok(nested.into_iter().flatten().collect())
            }
        }
    }
    .boxed()
}

/// Drain a directory reader until it returns an empty batch.
async fn read_all_entries(dir: &dyn DirectoryEntry) -> Result<Vec<FilesystemEntry>, IngestError> {
    let mut reader = dir.create_reader();
    let mut children = Vec::new();
    loop {
        let batch = reader.read_entries().await?;
        if batch.is_empty() {
            break;
        }
        children.extend(batch);
    }
    debug!(path = dir.full_path(), count = children.len(), "listed directory");
    Ok(children)
}

/// Root-relative path without the leading separator, falling back to the file name.
fn drop_path(full_path: &str, name: &str) -> String {
    let trimmed = full_path.strip_prefix('/').unwrap_or(full_path);
    if trimmed.is_empty() {
        base_name(name).to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::time::Duration;

    struct MockFile {
        name: String,
        size: u64,
        relative: Option<String>,
        body: Option<String>,
        delay_ms: u64,
    }

    #[async_trait]
    impl SourceFile for MockFile {
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
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.body.clone().ok_or_else(|| IngestError::Decode {
                path: self.name.clone(),
            })
        }
    }

    fn file(name: &str, body: &str) -> MockFile {
        MockFile {
            name: name.to_string(),
            size: body.len() as u64,
            relative: None,
            body: Some(body.to_string()),
            delay_ms: 0,
        }
    }

    fn picked(files: Vec<MockFile>) -> FileSource {
        FileSource::Files(
            files
                .into_iter()
                .map(|f| Arc::new(f) as Arc<dyn SourceFile>)
                .collect(),
        )
    }

    struct MockFileEntry {
        full_path: String,
        file: Option<Arc<MockFile>>,
    }

    #[async_trait]
    impl FileEntry for MockFileEntry {
        fn full_path(&self) -> &str {
            &self.full_path
        }

        async fn file(&self) -> Result<Arc<dyn SourceFile>, IngestError> {
            match &self.file {
                Some(f) => Ok(f.clone() as Arc<dyn SourceFile>),
                None => Err(IngestError::Read {
                    path: self.full_path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "gone"),
                }),
            }
        }
    }

    struct MockDir {
        full_path: String,
        children: Vec<FilesystemEntry>,
        batch_size: usize,
        fail: bool,
    }

    struct MockReader {
        path: String,
        pending: VecDeque<FilesystemEntry>,
        batch_size: usize,
        fail: bool,
    }

    impl DirectoryEntry for MockDir {
        fn full_path(&self) -> &str {
            &self.full_path
        }

        fn create_reader(&self) -> Box<dyn DirectoryReader> {
            Box::new(MockReader {
                path: self.full_path.clone(),
                pending: self.children.iter().cloned().collect(),
                batch_size: self.batch_size,
                fail: self.fail,
            })
        }
    }

    #[async_trait]
    impl DirectoryReader for MockReader {
        async fn read_entries(&mut self) -> Result<Vec<FilesystemEntry>, IngestError> {
            if self.fail {
                return Err(IngestError::Enumeration {
                    path: self.path.clone(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            let n = self.batch_size.min(self.pending.len());
            Ok(self.pending.drain(..n).collect())
        }
    }

    fn file_entry(full_path: &str, body: &str, delay_ms: u64) -> FilesystemEntry {
        let mut f = file(base_name(full_path), body);
        f.delay_ms = delay_ms;
        FilesystemEntry::File(Arc::new(MockFileEntry {
            full_path: full_path.to_string(),
            file: Some(Arc::new(f)),
        }))
    }

    fn dir(full_path: &str, children: Vec<FilesystemEntry>) -> FilesystemEntry {
        FilesystemEntry::Directory(Arc::new(MockDir {
            full_path: full_path.to_string(),
            children,
            batch_size: 100,
            fail: false,
        }))
    }

    fn paths(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_mixed_batch_filters_extension_and_size() {
        let mut big = file("data.json", "{}");
        big.size = 6 * 1024 * 1024;
        let source = picked(vec![file("script.py", "print(1)\n\n"), file("tool.exe", "MZ"), big]);

        let records = Ingestor::default().ingest(vec![source]).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "script.py");
        assert_eq!(records[0].path, "script.py");
        assert_eq!(records[0].size, 10);
        assert_eq!(records[0].content, "print(1)\n\n");
    }

    #[tokio::test]
    async fn test_size_ceiling_is_exclusive() {
        let mut at_limit = file("at.txt", "x");
        at_limit.size = MAX_FILE_SIZE;
        let mut below = file("below.txt", "y");
        below.size = MAX_FILE_SIZE - 1;

        let records = Ingestor::default()
            .ingest(vec![picked(vec![at_limit, below])])
            .await
            .unwrap();

        assert_eq!(paths(&records), vec!["below.txt"]);
    }

    #[tokio::test]
    async fn test_picked_folder_keeps_relative_path() {
        let mut nested = file("main.go", "package main");
        nested.relative = Some("proj/cmd/main.go".into());
        let records = Ingestor::default()
            .ingest(vec![picked(vec![nested])])
            .await
            .unwrap();
        assert_eq!(records[0].name, "main.go");
        assert_eq!(records[0].path, "proj/cmd/main.go");
    }

    #[tokio::test]
    async fn test_nested_drop_keeps_discovery_order() {
        let tree = dir(
            "/proj",
            vec![
                file_entry("/proj/a.py", "a", 0),
                dir(
                    "/proj/src",
                    vec![
                        file_entry("/proj/src/main.rs", "fn main() {}", 0),
                        dir(
                            "/proj/src/lib",
                            vec![
                                file_entry("/proj/src/lib/x.ts", "x", 0),
                                file_entry("/proj/src/lib/y.md", "y", 0),
                                file_entry("/proj/src/lib/skip.bin", "z", 0),
                            ],
                        ),
                    ],
                ),
                file_entry("/proj/z.txt", "z", 0),
            ],
        );

        let records = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![tree])])
            .await
            .unwrap();

        assert_eq!(
            paths(&records),
            vec![
                "proj/a.py",
                "proj/src/main.rs",
                "proj/src/lib/x.ts",
                "proj/src/lib/y.md",
                "proj/z.txt",
            ]
        );
        assert_eq!(records[2].name, "x.ts");
    }

    #[tokio::test]
    async fn test_order_ignores_read_completion_order() {
        let tree = dir(
            "/slow",
            vec![
                file_entry("/slow/1.rs", "1", 60),
                file_entry("/slow/2.rs", "2", 40),
                file_entry("/slow/3.rs", "3", 20),
                file_entry("/slow/4.rs", "4", 0),
            ],
        );

        let ingestor = Ingestor::new(IngestOptions {
            max_in_flight: 2,
            ..IngestOptions::default()
        });
        let records = ingestor
            .ingest(vec![FileSource::Entries(vec![tree])])
            .await
            .unwrap();

        let contents: Vec<_> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_dropped_alone() {
        let mut broken = file("broken.rs", "");
        broken.body = None;
        let source = picked(vec![file("ok.rs", "fine"), broken, file("also.rs", "fine")]);

        let records = Ingestor::default().ingest(vec![source]).await.unwrap();
        assert_eq!(paths(&records), vec!["ok.rs", "also.rs"]);
    }

    #[tokio::test]
    async fn test_unresolvable_file_entry_is_dropped_alone() {
        let missing = FilesystemEntry::File(Arc::new(MockFileEntry {
            full_path: "/d/missing.rs".into(),
            file: None,
        }));
        let tree = dir("/d", vec![missing, file_entry("/d/here.rs", "ok", 0)]);

        let records = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![tree])])
            .await
            .unwrap();
        assert_eq!(paths(&records), vec!["d/here.rs"]);
    }

    #[tokio::test]
    async fn test_enumeration_failure_fails_batch() {
        let locked = FilesystemEntry::Directory(Arc::new(MockDir {
            full_path: "/root/locked".into(),
            children: Vec::new(),
            batch_size: 10,
            fail: true,
        }));
        let tree = dir("/root", vec![file_entry("/root/ok.md", "ok", 0), locked]);

        let err = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![tree])])
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Enumeration { .. }));
        assert_eq!(err.path(), "/root/locked");
    }

    #[tokio::test]
    async fn test_batched_listing_is_drained() {
        let children: Vec<_> = (0..5)
            .map(|i| file_entry(&format!("/big/f{}.txt", i), "t", 0))
            .collect();
        let tree = FilesystemEntry::Directory(Arc::new(MockDir {
            full_path: "/big".into(),
            children,
            batch_size: 2,
            fail: false,
        }));

        let records = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![tree])])
            .await
            .unwrap();
        assert_eq!(
            paths(&records),
            vec!["big/f0.txt", "big/f1.txt", "big/f2.txt", "big/f3.txt", "big/f4.txt"]
        );
    }

    #[tokio::test]
    async fn test_same_node_is_not_visited_twice() {
        let shared_file = file_entry("/loose.sh", "echo", 0);
        let records = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![
                shared_file.clone(),
                shared_file,
            ])])
            .await
            .unwrap();
        assert_eq!(paths(&records), vec!["loose.sh"]);
    }

    #[tokio::test]
    async fn test_distinct_nodes_sharing_a_path_are_both_read() {
        let first = dir("/src", vec![file_entry("/src/one.rs", "1", 0)]);
        let second = dir("/src", vec![file_entry("/src/two.rs", "2", 0)]);
        let records = Ingestor::default()
            .ingest(vec![FileSource::Entries(vec![first, second])])
            .await
            .unwrap();
        assert_eq!(paths(&records), vec!["src/one.rs", "src/two.rs"]);
    }

    #[tokio::test]
    async fn test_sources_are_concatenated_in_order() {
        let drop = FileSource::Entries(vec![file_entry("/dropped.sql", "select 1", 0)]);
        let records = Ingestor::default()
            .ingest(vec![picked(vec![file("picked.yml", "a: 1")]), drop])
            .await
            .unwrap();
        assert_eq!(paths(&records), vec!["picked.yml", "dropped.sql"]);
    }

    #[test]
    fn test_drop_path() {
        assert_eq!(drop_path("/a/b.rs", "b.rs"), "a/b.rs");
        assert_eq!(drop_path("a/b.rs", "b.rs"), "a/b.rs");
        assert_eq!(drop_path("", "b.rs"), "b.rs");
    }
}
