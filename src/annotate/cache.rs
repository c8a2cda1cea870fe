use std::collections::HashMap;
use std::sync::Mutex;

/// Process-scoped key-value cache for ticker → CIK lookups.
///
/// Constructed once at startup and handed to the EDGAR client, so the cache's
/// lifetime is explicit instead of hiding behind a module-level static. Not
/// persisted; a restart refetches the ticker map.
#[derive(Default)]
pub struct TickerCache {
    entries: Mutex<HashMap<String, String>>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<String> {
        self.entries.lock().unwrap().get(ticker).cloned()
    }

    pub fn put(&self, ticker: String, cik: String) {
        self.entries.lock().unwrap().insert(ticker, cik);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
