use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{DedupError, Result};

/// An image file discovered inside the folder being cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Path relative to the scanned folder, `/`-separated.
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Creation time, falling back to modification time, then UNIX_EPOCH.
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub extensions: Vec<String>,
    /// Directories never walked. Relative entries are resolved against the
    /// scanned folder.
    pub exclude: Vec<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            exclude: vec![PathBuf::from(crate::dedup::DEFAULT_MOVE_DIR)],
        }
    }
}

impl ScanOptions {
    fn accepts(&self, path: &Path) -> bool {
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    /// `exclude` as paths comparable with what the walker yields for `folder`.
    fn excluded_dirs(&self, folder: &Path) -> Vec<PathBuf> {
        let root = folder.canonicalize().ok();
        self.exclude
            .iter()
            .map(|dir| {
                if dir.is_relative() {
                    return folder.join(dir);
                }
                let resolved = dir.canonicalize().unwrap_or_else(|_| dir.clone());
                match root.as_ref().and_then(|root| resolved.strip_prefix(root).ok()) {
                    Some(inside) => folder.join(inside),
                    None => dir.clone(),
                }
            })
            .collect()
    }
}

/// Check that `folder` exists and is a directory.
pub fn ensure_folder(folder: &Path) -> Result<()> {
    if !folder.exists() {
        return Err(DedupError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }
    if !folder.is_dir() {
        return Err(DedupError::NotADirectory {
            path: folder.to_path_buf(),
        });
    }
    Ok(())
}

/// List the image files of `folder`, sorted by name.
///
/// Hidden entries are ignored, so neither the history log nor anything under
/// a dot-directory is ever treated as an image. Directories in
/// `options.exclude` (by default the move target) are skipped. Only the
/// folder itself is read unless `options.recursive` is set.
pub fn scan_folder(folder: &Path, options: &ScanOptions) -> Result<Vec<ImageFile>> {
    ensure_folder(folder)?;

    let walker = if options.recursive {
        WalkDir::new(folder)
    } else {
        WalkDir::new(folder).max_depth(1)
    };

    let excluded = options.excluded_dirs(folder);
    let mut images = Vec::new();
    let entries = walker
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if is_hidden(entry.file_name()) {
                return false;
            }
            !(entry.file_type().is_dir() && excluded.iter().any(|dir| dir == entry.path()))
        });

    for entry in entries {
        let entry = entry?;
        if !entry.file_type().is_file() || !options.accepts(entry.path()) {
            continue;
        }

        let path = entry.path();
        let metadata = fs::metadata(path)?;
        let timestamp = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        images.push(ImageFile {
            name: relative_name(folder, path),
            path: path.to_path_buf(),
            size: metadata.len(),
            timestamp,
        });
    }

    Ok(images)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn relative_name(folder: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("b.JPG"), b"b").unwrap();
        fs::write(root.join("a.png"), b"a").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join(".history.jsonl"), b"{}").unwrap();
        fs::create_dir(root.join("duplicates")).unwrap();
        fs::write(root.join("duplicates").join("c.jpg"), b"c").unwrap();

        let images = scan_folder(root, &ScanOptions::default()).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.JPG"]);
        assert_eq!(images[0].size, 1);
    }

    #[test]
    fn test_recursive_scan_uses_relative_names() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("x.jpg"), b"x").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("y.jpg"), b"y").unwrap();

        let options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        let images = scan_folder(root, &options).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["sub/x.jpg"]);
    }

    #[test]
    fn test_recursive_scan_skips_move_target() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::create_dir_all(root.join("duplicates").join("sub")).unwrap();
        fs::write(root.join("duplicates").join("sub").join("a.jpg"), b"a").unwrap();
        fs::create_dir(root.join("culled")).unwrap();
        fs::write(root.join("culled").join("b.jpg"), b"b").unwrap();
        fs::create_dir(root.join("keep")).unwrap();
        fs::write(root.join("keep").join("c.jpg"), b"c").unwrap();

        let mut options = ScanOptions {
            recursive: true,
            ..ScanOptions::default()
        };
        options.exclude.push(root.join("culled"));

        let images = scan_folder(root, &options).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "keep/c.jpg"]);
    }

    #[test]
    fn test_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        assert!(matches!(
            scan_folder(&missing, &ScanOptions::default()),
            Err(DedupError::FolderNotFound { .. })
        ));
    }

    #[test]
    fn test_file_is_not_a_folder() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.jpg");
        fs::write(&file, b"a").unwrap();
        assert!(matches!(
            scan_folder(&file, &ScanOptions::default()),
            Err(DedupError::NotADirectory { .. })
        ));
    }
}
