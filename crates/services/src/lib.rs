//! File ingestion services: turning picked and dropped files into
//! in-memory attachment records.

pub mod ingest;
pub mod local_fs;

pub use ingest::{
    DirectoryEntry, DirectoryReader, FileEntry, FileSource, FilesystemEntry, IngestOptions,
    Ingestor, SourceFile,
};
pub use local_fs::{LocalEntry, LocalFile};
