use super::error::UpstoxError;
use super::models::MasterEntry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Symbol → underlying instrument key, read from the instrument master
#[derive(Debug, Clone, Default)]
pub struct InstrumentMaster {
    keys: BTreeMap<String, String>,
}

impl InstrumentMaster {
    /// First occurrence of a symbol wins. Entries without a symbol or key
    /// are skipped.
    pub fn from_entries(entries: impl IntoIterator<Item = MasterEntry>) -> Self {
        let mut keys = BTreeMap::new();

        for entry in entries {
            let (Some(symbol), Some(key)) = (entry.underlying_symbol, entry.underlying_key) else {
                continue;
            };
            let symbol = symbol.trim().to_uppercase();
            let key = key.trim().to_string();
            if symbol.is_empty() || key.is_empty() {
                continue;
            }
            keys.entry(symbol).or_insert(key);
        }

        Self { keys }
    }

    /// Parse a master JSON array. Malformed entries are ignored.
    pub fn from_json_str(text: &str) -> Result<Self, UpstoxError> {
        let raw: Vec<Value> = serde_json::from_str(text)?;
        let entries = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<MasterEntry>(v).ok());
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, UpstoxError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| UpstoxError::MasterFile {
            path: path.display().to_string(),
            source,
        })?;

        let master = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), symbols = master.len(), "Loaded instrument master");
        Ok(master)
    }

    pub fn resolve(&self, symbol: &str) -> Option<&str> {
        self.keys.get(&symbol.trim().to_uppercase()).map(String::as_str)
    }

    /// All known symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
