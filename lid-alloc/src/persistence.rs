use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::lid::{Guid, Lid};

/// Thin typed view over a guid→(min,max) key-value store.
///
/// All operations are atomic with respect to concurrent readers of the
/// in-memory view; durability of [`GuidLidStore::store`] is the backend's
/// contract, not this trait's. `load`/`restore` failure is either fatal (in
/// strict mode, handled by the caller) or surfaced as an empty map with a
/// logged error.
pub trait GuidLidStore {
    /// Reloads the in-memory view from the backing medium.
    fn load(&mut self) -> Result<(), StoreError>;
    /// Flushes the in-memory view to the backing medium.
    fn store(&mut self) -> Result<(), StoreError>;
    /// Drops every record, in memory only.
    fn clear(&mut self);
    fn enumerate_guids(&self) -> Vec<Guid>;
    fn get(&self, guid: Guid) -> Option<(Lid, Lid)>;
    fn set(&mut self, guid: Guid, min: Lid, max: Lid);
    fn delete(&mut self, guid: Guid);
}

/// Reference in-memory store used by tests and the demo binary. Never
/// touches disk; `load`/`store` are no-ops.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGuidLidStore {
    records: HashMap<Guid, (Lid, Lid)>,
}

impl InMemoryGuidLidStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(records: impl IntoIterator<Item = (Guid, Lid, Lid)>) -> Self {
        let mut store = Self::new();
        for (guid, min, max) in records {
            store.set(guid, min, max);
        }
        store
    }
}

impl GuidLidStore for InMemoryGuidLidStore {
    fn load(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn store(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    fn enumerate_guids(&self) -> Vec<Guid> {
        self.records.keys().copied().collect()
    }

    fn get(&self, guid: Guid) -> Option<(Lid, Lid)> {
        self.records.get(&guid).copied()
    }

    fn set(&mut self, guid: Guid, min: Lid, max: Lid) {
        self.records.insert(guid, (min, max));
    }

    fn delete(&mut self, guid: Guid) {
        self.records.remove(&guid);
    }
}

/// Reference persistence adaptor over a flat file, one record per line in
/// the historical `guid:16-hex min_lid:4-hex max_lid:4-hex` format. Loaded
/// eagerly into an in-memory map; `store()` flushes the whole map back out.
pub struct FileGuidLidStore {
    path: PathBuf,
    records: HashMap<Guid, (Lid, Lid)>,
}

impl FileGuidLidStore {
    /// Opens the adaptor against `path` without reading it; call
    /// [`GuidLidStore::load`] to populate the in-memory view.
    pub fn domain_init(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: HashMap::new(),
        }
    }

    fn parse_line(line: &str) -> Result<Option<(Guid, Lid, Lid)>, StoreError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let mut parts = line.split_whitespace();
        let guid_s = parts
            .next()
            .ok_or_else(|| StoreError::Malformed(line.to_owned()))?;
        let min_s = parts
            .next()
            .ok_or_else(|| StoreError::Malformed(line.to_owned()))?;
        let max_s = parts
            .next()
            .ok_or_else(|| StoreError::Malformed(line.to_owned()))?;

        let guid = u64::from_str_radix(guid_s, 16)
            .map_err(|_| StoreError::Malformed(line.to_owned()))?;
        let min = u16::from_str_radix(min_s, 16)
            .map_err(|_| StoreError::Malformed(line.to_owned()))?;
        let max = u16::from_str_radix(max_s, 16)
            .map_err(|_| StoreError::Malformed(line.to_owned()))?;

        Ok(Some((Guid(guid), Lid(min), Lid(max))))
    }

    fn format_line(guid: Guid, min: Lid, max: Lid) -> String {
        format!("{:016x} {:04x} {:04x}", guid.0, min.0, max.0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GuidLidStore for FileGuidLidStore {
    fn load(&mut self) -> Result<(), StoreError> {
        self.records.clear();

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::Load(e)),
        };

        for line in contents.lines() {
            if let Some((guid, min, max)) = Self::parse_line(line)? {
                self.records.insert(guid, (min, max));
            }
        }
        Ok(())
    }

    fn store(&mut self) -> Result<(), StoreError> {
        let mut buf = String::with_capacity(self.records.len() * 26);
        for (guid, (min, max)) in &self.records {
            buf.push_str(&Self::format_line(*guid, *min, *max));
            buf.push('\n');
        }
        std::fs::write(&self.path, buf).map_err(StoreError::Save)
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    fn enumerate_guids(&self) -> Vec<Guid> {
        self.records.keys().copied().collect()
    }

    fn get(&self, guid: Guid) -> Option<(Lid, Lid)> {
        self.records.get(&guid).copied()
    }

    fn set(&mut self, guid: Guid, min: Lid, max: Lid) {
        self.records.insert(guid, (min, max));
    }

    fn delete(&mut self, guid: Guid) {
        self.records.remove(&guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!(
            "lid-alloc-test-{}-{}",
            std::process::id(),
            line!()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("guid2lid");

        let mut store = FileGuidLidStore::domain_init(&path);
        store.load().unwrap();
        store.set(Guid(0x1122334455667788), Lid(4), Lid(7));
        store.store().unwrap();

        let mut reloaded = FileGuidLidStore::domain_init(&path);
        reloaded.load().unwrap();
        assert_eq!(
            reloaded.get(Guid(0x1122334455667788)),
            Some((Lid(4), Lid(7)))
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_loads_empty() {
        let mut store = FileGuidLidStore::domain_init("/nonexistent/path/guid2lid");
        store.load().unwrap();
        assert!(store.enumerate_guids().is_empty());
    }

    #[test]
    fn malformed_line_is_rejected() {
        let dir = std::env::temp_dir().join(format!(
            "lid-alloc-test-malformed-{}-{}",
            std::process::id(),
            line!()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("guid2lid");
        std::fs::write(&path, "not a valid record\n").unwrap();

        let mut store = FileGuidLidStore::domain_init(&path);
        assert!(store.load().is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
