//! Attached file records and the extension/size policy applied to them.

use serde::{Deserialize, Serialize};

/// Files at or above this size are never attached.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Extensions (lower-case, without the dot) accepted for attachment.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "cpp", "c", "cs", "php", "rb", "go", "rs", "swift",
    "kt", "html", "css", "json", "xml", "md", "txt", "yml", "yaml", "sh", "sql", "r",
];

/// Subset of the allow-list shown with a code label rather than a plain file label.
pub const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "cpp", "c", "cs", "php", "rb", "go", "rs", "swift",
    "kt",
];

/// One ingested text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Base file name
    pub name: String,
    /// Relative path including any directory prefix
    pub path: String,
    pub content: String,
    /// Byte length at read time
    pub size: u64,
}

impl FileRecord {
    pub fn is_code(&self) -> bool {
        is_code_file(&self.name)
    }

    /// Size in KiB, as shown next to pending attachments.
    pub fn size_kb(&self) -> String {
        format!("{:.1} KB", self.size as f64 / 1024.0)
    }
}

/// Lower-cased suffix after the last `.`, if the name has one.
pub fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

pub fn is_allowed_extension(name: &str) -> bool {
    extension_of(name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_code_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Last path component of a `/`-separated relative path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
