use std::collections::HashMap;
use std::io;

/// Host key/value storage for battery RAM, the cartridge clock and save
/// states. Keys are plain ASCII strings built by [`sram_key`], [`rtc_key`]
/// and [`freeze_key`].
pub trait SaveStore {
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    fn store(&mut self, key: &str, data: &[u8]) -> io::Result<()>;
}

pub fn sram_key(title: &str) -> String {
    format!("SRAM_{title}")
}

pub fn rtc_key(title: &str) -> String {
    format!("RTC_{title}")
}

pub fn freeze_key(title: &str, slot: &str) -> String {
    format!("FREEZE_{title}_{slot}")
}

/// First numbered slot with nothing stored under it.
pub fn next_free_slot(store: &dyn SaveStore, title: &str) -> u32 {
    (0..)
        .find(|slot| store.load(&freeze_key(title, &slot.to_string())).is_none())
        .unwrap_or_default()
}

/// Storage that lives and dies with the process. Used when the host has
/// nowhere to persist, and by tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl SaveStore for MemoryStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: &str, data: &[u8]) -> io::Result<()> {
        self.entries.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
