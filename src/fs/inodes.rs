use std::collections::HashMap;

/// The kernel's inode number for the filesystem root.
pub const ROOT_INO: u64 = 1;

/// Bidirectional ino <-> path table.
///
/// The kernel addresses nodes by inode number while the engine is
/// path-addressed, so the bridge assigns an ino to every path it has handed
/// out and resolves incoming inos back. Entries for unlinked or renamed-over
/// paths are dropped; a stale ino then resolves to nothing and the kernel
/// re-looks-up.
pub struct InodeTable {
    ino_to_path: HashMap<u64, String>,
    path_to_ino: HashMap<String, u64>,
    next_ino: u64,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            ino_to_path: HashMap::new(),
            path_to_ino: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.ino_to_path.insert(ROOT_INO, "/".to_string());
        table.path_to_ino.insert("/".to_string(), ROOT_INO);
        table
    }

    /// Return the ino for a path, allocating one on first sight.
    pub fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.ino_to_path.insert(ino, path.to_string());
        self.path_to_ino.insert(path.to_string(), ino);
        ino
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.ino_to_path.get(&ino).map(String::as_str)
    }

    /// Drop the mapping for a deleted path.
    pub fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }

    /// Re-key a renamed path, keeping its ino. Any mapping previously held
    /// by the destination path is dropped.
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(ino) = self.path_to_ino.remove(new) {
            self.ino_to_path.remove(&ino);
        }
        if let Some(ino) = self.path_to_ino.remove(old) {
            self.path_to_ino.insert(new.to_string(), ino);
            self.ino_to_path.insert(ino, new.to_string());
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_pinned_to_ino_one() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some("/"));
    }

    #[test]
    fn assign_is_stable_per_path() {
        let mut table = InodeTable::new();
        let a = table.assign("/a");
        assert_eq!(table.assign("/a"), a);
        assert_ne!(table.assign("/b"), a);
        assert_eq!(table.path(a), Some("/a"));
    }

    #[test]
    fn forget_drops_both_directions() {
        let mut table = InodeTable::new();
        let a = table.assign("/a");
        table.forget_path("/a");
        assert_eq!(table.path(a), None);
        assert_ne!(table.assign("/a"), a);
    }

    #[test]
    fn rename_keeps_the_ino_and_evicts_the_target() {
        let mut table = InodeTable::new();
        let a = table.assign("/a");
        let b = table.assign("/b");
        table.rename("/a", "/b");
        assert_eq!(table.path(a), Some("/b"));
        assert_eq!(table.path(b), None);
        assert_eq!(table.assign("/b"), a);
    }
}
