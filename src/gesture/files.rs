use serde::{Deserialize, Serialize};
use std::path::Path;

/// One file or folder carried by a drag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraggedFileEntry {
    pub path: String,
    pub name: String,
    /// Extension without the dot. `None` for folders and extensionless files.
    pub extension: Option<String>,
    pub is_directory: bool,
    pub exists: bool,
    /// Size of regular files that exist.
    pub size_bytes: Option<u64>,
}

impl DraggedFileEntry {
    /// Describe `path`, filling in what the filesystem can tell us about it.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).ok();
        let exists = metadata.is_some();
        let is_directory = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let size_bytes = metadata
            .as_ref()
            .filter(|m| m.is_file())
            .map(|m| m.len());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let extension = if is_directory {
            None
        } else {
            path.extension().map(|e| e.to_string_lossy().into_owned())
        };

        Self {
            path: path.to_string_lossy().into_owned(),
            name,
            extension,
            is_directory,
            exists,
            size_bytes,
        }
    }
}

/// Source of the file list behind an in-progress drag (clipboard, shell
/// drag-and-drop data, ...).
///
/// Called synchronously from the coalescer thread, at most once per gesture.
/// An empty list means the drag carries no files.
pub trait FileListProvider: Send + Sync {
    fn try_get_dragged_files(&self) -> Vec<DraggedFileEntry>;
}

impl<F> FileListProvider for F
where
    F: Fn() -> Vec<DraggedFileEntry> + Send + Sync,
{
    fn try_get_dragged_files(&self) -> Vec<DraggedFileEntry> {
        self()
    }
}

/// Provider for hosts without file extraction; never confirms a drag.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFiles;

impl FileListProvider for NoFiles {
    fn try_get_dragged_files(&self) -> Vec<DraggedFileEntry> {
        Vec::new()
    }
}
