use bitflags::bitflags;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use warden_core::error::{PermissionError, Result};
use warden_core::traits::{Permission, PermissionCollection};

/// Kind of filesystem permissions
pub const FILE_KIND: &str = "file";

/// Special path matching every file
pub const ALL_FILES: &str = "<<ALL FILES>>";

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Represents file actions as a bit field for efficient checking
    pub struct FileActions: u8 {
        const READ = 0b00001;
        const WRITE = 0b00010;
        const EXECUTE = 0b00100;
        const DELETE = 0b01000;
        const READLINK = 0b10000;
    }
}

const ACTION_NAMES: [(&str, FileActions); 5] = [
    ("read", FileActions::READ),
    ("write", FileActions::WRITE),
    ("execute", FileActions::EXECUTE),
    ("delete", FileActions::DELETE),
    ("readlink", FileActions::READLINK),
];

impl FileActions {
    /// Parses a comma separated action list such as `"read,write"`.
    pub fn parse(actions: &str) -> Result<Self> {
        let mut mask = FileActions::empty();
        for action in actions.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let action = action.to_lowercase();
            match ACTION_NAMES.iter().find(|(name, _)| *name == action) {
                Some((_, flag)) => mask |= *flag,
                None => {
                    return Err(PermissionError::InvalidArgument(format!(
                        "invalid file action '{}'",
                        action
                    ))
                    .into())
                }
            }
        }
        if mask.is_empty() {
            return Err(
                PermissionError::InvalidArgument("file actions can't be empty".into()).into(),
            );
        }
        Ok(mask)
    }

    /// Canonical action string, in `read,write,execute,delete,readlink` order.
    pub fn canonical(&self) -> String {
        ACTION_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Shape of a file permission's target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathPattern {
    /// `<<ALL FILES>>`
    AllFiles,
    /// `dir/-`: every file below `dir`, recursively. Holds `dir/`.
    Recursive(String),
    /// `dir/*`: every file directly in `dir`. Holds `dir/`.
    Directory(String),
    /// A single file.
    File(String),
}

/// Lexically normalizes a path: collapses repeated separators and `.`, and
/// resolves `..` where possible.
fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

fn directory_prefix(dir: &str) -> String {
    let dir = normalize(dir);
    if dir.is_empty() || dir.ends_with('/') {
        dir
    } else {
        format!("{}/", dir)
    }
}

impl PathPattern {
    fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(PermissionError::InvalidArgument("file path can't be empty".into()).into());
        }
        if path == ALL_FILES {
            return Ok(PathPattern::AllFiles);
        }
        if path == "-" || path.ends_with("/-") {
            return Ok(PathPattern::Recursive(directory_prefix(
                &path[..path.len() - 1],
            )));
        }
        if path == "*" || path.ends_with("/*") {
            return Ok(PathPattern::Directory(directory_prefix(
                &path[..path.len() - 1],
            )));
        }
        if path.contains('*') {
            return Err(PermissionError::InvalidArgument(format!(
                "malformed wildcard in file path '{}'",
                path
            ))
            .into());
        }
        Ok(PathPattern::File(normalize(path)))
    }

    /// Path containment, ignoring actions.
    fn implies(&self, that: &PathPattern) -> bool {
        use PathPattern::*;
        match (self, that) {
            (AllFiles, _) => true,
            (_, AllFiles) => false,
            (Recursive(this), Recursive(other)) | (Recursive(this), Directory(other)) => {
                other.starts_with(this.as_str())
            }
            (Recursive(this), File(other)) => {
                other.len() > this.len() && other.starts_with(this.as_str())
            }
            (Directory(_), Recursive(_)) => false,
            (Directory(this), Directory(other)) => this == other,
            (Directory(this), File(other)) => match other.rfind('/') {
                Some(last) => this.len() == last + 1 && other.starts_with(this.as_str()),
                None => this.is_empty(),
            },
            (File(_), Recursive(_)) | (File(_), Directory(_)) => false,
            (File(this), File(other)) => this == other,
        }
    }
}

/// A capability to access files in the filesystem
///
/// The target is a path pattern: `<<ALL FILES>>`, `dir/*` (files directly in
/// `dir`), `dir/-` (everything below `dir`) or a plain path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePermission {
    /// Path as given by the caller
    path: String,
    pattern: PathPattern,
    mask: FileActions,
    actions: String,
}

impl FilePermission {
    /// Creates a file permission from a path pattern and an action list
    pub fn new(path: &str, actions: &str) -> Result<Self> {
        let mask = FileActions::parse(actions)?;
        Self::with_mask(path, mask)
    }

    /// Creates a file permission from a path pattern and an action mask
    pub fn with_mask(path: &str, mask: FileActions) -> Result<Self> {
        if mask.is_empty() {
            return Err(
                PermissionError::InvalidArgument("file actions can't be empty".into()).into(),
            );
        }
        Ok(Self {
            path: path.to_string(),
            pattern: PathPattern::parse(path)?,
            mask,
            actions: mask.canonical(),
        })
    }

    /// Creates a file permission for read access
    pub fn read(path: &str) -> Result<Self> {
        Self::with_mask(path, FileActions::READ)
    }

    /// Creates a file permission for read and write access
    pub fn read_write(path: &str) -> Result<Self> {
        Self::with_mask(path, FileActions::READ | FileActions::WRITE)
    }

    /// Gets actions this permission grants
    pub fn mask(&self) -> FileActions {
        self.mask
    }

    /// Path containment, ignoring actions
    pub fn implies_path(&self, other: &FilePermission) -> bool {
        self.pattern.implies(&other.pattern)
    }
}

impl Permission for FilePermission {
    fn kind(&self) -> &str {
        FILE_KIND
    }

    fn name(&self) -> &str {
        &self.path
    }

    fn actions(&self) -> Option<&str> {
        Some(&self.actions)
    }

    fn implies(&self, other: &dyn Permission) -> bool {
        match other.as_any().downcast_ref::<FilePermission>() {
            Some(that) => self.mask.contains(that.mask) && self.implies_path(that),
            None => false,
        }
    }

    fn new_collection(&self) -> Option<Box<dyn PermissionCollection>> {
        Some(Box::new(FilePermissionCollection::new()))
    }

    fn clone_box(&self) -> Box<dyn Permission> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Default)]
struct FileEntries {
    by_path: HashMap<String, FilePermission>,
    order: Vec<String>,
}

/// Collection of [`FilePermission`]s.
///
/// Entries for the same path are merged. A query succeeds when the union of
/// the actions of all entries whose pattern covers the requested path
/// contains the requested actions, so `/tmp/-:read` plus `/tmp/a:write`
/// together imply `/tmp/a:read,write`.
#[derive(Debug, Default)]
pub struct FilePermissionCollection {
    entries: RwLock<FileEntries>,
    read_only: AtomicBool,
}

impl FilePermissionCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionCollection for FilePermissionCollection {
    fn add(&self, permission: Box<dyn Permission>) -> Result<()> {
        let file = permission
            .as_any()
            .downcast_ref::<FilePermission>()
            .ok_or_else(|| {
                PermissionError::InvalidArgument(format!("invalid permission: {}", permission))
            })?;

        if self.is_read_only() {
            return Err(PermissionError::ReadOnly(permission.to_string()).into());
        }

        let mut entries = self.entries.write();
        match entries.by_path.get(&file.path) {
            Some(existing) => {
                let merged = existing.mask | file.mask;
                if merged != existing.mask {
                    let updated = FilePermission::with_mask(&file.path, merged)?;
                    entries.by_path.insert(file.path.clone(), updated);
                }
            }
            None => {
                entries.order.push(file.path.clone());
                entries.by_path.insert(file.path.clone(), file.clone());
            }
        }
        Ok(())
    }

    fn implies(&self, permission: &dyn Permission) -> bool {
        let Some(wanted) = permission.as_any().downcast_ref::<FilePermission>() else {
            return false;
        };

        let entries = self.entries.read();
        let desired = wanted.mask;
        let mut effective = FileActions::empty();
        let mut needed = desired;

        for path in &entries.order {
            let Some(granted) = entries.by_path.get(path) else {
                continue;
            };
            if needed.intersects(granted.mask) && granted.implies_path(wanted) {
                effective |= granted.mask;
                if effective.contains(desired) {
                    return true;
                }
                needed = desired - effective;
            }
        }

        false
    }

    fn elements(&self) -> Vec<Box<dyn Permission>> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|path| entries.by_path.get(path))
            .map(|p| p.clone_box())
            .collect()
    }

    fn set_read_only(&self) {
        self.read_only.store(true, Ordering::Release);
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.entries.read().order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &str) -> FilePermission {
        FilePermission::read(path).unwrap()
    }

    #[test]
    fn test_directory_pattern() {
        let tmp = read("/tmp/*");
        assert!(tmp.implies(&read("/tmp/a")));
        assert!(!tmp.implies(&read("/tmp/a/b")));
        assert!(!tmp.implies(&read("/etc/passwd")));
        assert!(!tmp.implies(&read("/tmp")));
    }

    #[test]
    fn test_recursive_pattern() {
        let tmp = read("/tmp/-");
        assert!(tmp.implies(&read("/tmp/a")));
        assert!(tmp.implies(&read("/tmp/a/b")));
        assert!(tmp.implies(&read("/tmp/*")));
        assert!(tmp.implies(&read("/tmp/a/-")));
        assert!(!tmp.implies(&read("/tmp")));
        assert!(!read("/tmp/*").implies(&tmp));
    }

    #[test]
    fn test_all_files_and_normalization() {
        let all = read(ALL_FILES);
        assert!(all.implies(&read("/anything/at/all")));
        assert!(!read("/-").implies(&all));

        assert!(read("/tmp//a/./b").implies(&read("/tmp/a/b")));
        assert!(read("/tmp/x/../a").implies(&read("/tmp/a")));
    }

    #[test]
    fn test_actions() {
        let rw = FilePermission::new("/tmp/a", "write, READ").unwrap();
        assert_eq!(rw.actions(), Some("read,write"));
        assert!(rw.implies(&read("/tmp/a")));
        assert!(!read("/tmp/a").implies(&rw));

        assert!(FilePermission::new("/tmp/a", "").is_err());
        assert!(FilePermission::new("/tmp/a", "read,chmod").is_err());
        assert!(FilePermission::new("/tmp/a*", "read").is_err());
    }

    #[test]
    fn test_collection_accumulates_actions() {
        let collection = FilePermissionCollection::new();
        collection.add(Box::new(read("/tmp/-"))).unwrap();
        collection
            .add(Box::new(FilePermission::new("/tmp/a", "write").unwrap()))
            .unwrap();

        assert!(collection.implies(&FilePermission::read_write("/tmp/a").unwrap()));
        assert!(!collection.implies(&FilePermission::read_write("/tmp/b").unwrap()));
        assert!(collection.implies(&read("/tmp/b")));
    }

    #[test]
    fn test_collection_merges_same_path() {
        let collection = FilePermissionCollection::new();
        collection.add(Box::new(read("/tmp/a"))).unwrap();
        collection
            .add(Box::new(FilePermission::new("/tmp/a", "delete").unwrap()))
            .unwrap();

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.elements()[0].actions(), Some("read,delete"));
    }
}
