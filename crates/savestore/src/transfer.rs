//! Backup export/import and save statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize;
use crate::store::{Result, SaveError, SaveStore};

/// One exported save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSave {
    /// Logical key
    pub key: String,
    /// Decoded value
    pub value: Value,
    /// Value type name (`Number`, `Boolean`, `String`, `Array`, `Object`)
    #[serde(rename = "type")]
    pub kind: String,
}

/// Backup document holding every tracked save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Saves ordered by serialized size, largest first
    pub saves: Vec<ExportedSave>,
    /// When the document was produced
    pub export_time: DateTime<Utc>,
    /// Platform the saves were exported from
    pub platform: String,
    /// Number of saves in the document
    pub total_saves: usize,
}

/// Backup document holding a single save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleExport {
    /// Logical key
    pub key: String,
    /// Decoded value
    pub value: Value,
    /// When the document was produced
    pub export_time: DateTime<Utc>,
    /// Platform the save was exported from
    pub platform: String,
}

/// Import outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Saves written to the store
    pub imported: usize,
    /// Entries missing a key or value, or using a rejected key
    pub skipped: usize,
    /// Whether the follow-up flush succeeded
    pub flushed: bool,
}

/// Save statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStats {
    /// Number of tracked keys holding a value
    pub total_saves: usize,
    /// Total serialized size in bytes
    pub total_size_bytes: usize,
    /// Total size, human formatted
    pub total_size: String,
    /// Platform name
    pub platform: String,
    /// When the backend last accepted a write
    pub last_save: Option<DateTime<Utc>>,
}

struct SizedSave {
    save: ExportedSave,
    size: usize,
}

/// Format a byte count using 1024-based units, e.g. `1.5 KB`
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

impl SaveStore {
    /// Platform name recorded in exports and statistics
    pub fn platform(&self) -> String {
        match &self.inner.config.platform {
            Some(platform) => platform.clone(),
            None => self.backend_kind().to_string(),
        }
    }

    async fn collect_saves(&self) -> Vec<SizedSave> {
        let mut saves = Vec::new();

        for key in self.keys() {
            let value = match self.get(&key).await {
                Some(Value::Null) | None => continue,
                Some(value) => value,
            };

            let size = normalize::serialize(&value).len();
            let kind = normalize::type_name(&value).to_string();
            saves.push(SizedSave { save: ExportedSave { key, value, kind }, size });
        }

        saves.sort_by(|a, b| b.size.cmp(&a.size));
        saves
    }

    /// Export every tracked save
    pub async fn export_all(&self) -> ExportDocument {
        let saves: Vec<ExportedSave> =
            self.collect_saves().await.into_iter().map(|sized| sized.save).collect();

        tracing::info!(saves = saves.len(), "exported all saves");

        ExportDocument {
            total_saves: saves.len(),
            saves,
            export_time: Utc::now(),
            platform: self.platform(),
        }
    }

    /// Export a single save
    ///
    /// Returns `None` when the key has no value.
    pub async fn export_one(&self, key: &str) -> Option<SingleExport> {
        let Some(value) = self.get(key).await else {
            tracing::error!(key, "save not found for export");
            return None;
        };

        Some(SingleExport {
            key: key.to_string(),
            value,
            export_time: Utc::now(),
            platform: self.platform(),
        })
    }

    /// Import a backup document
    ///
    /// Accepts either the full export document or a single `{key, value}`
    /// document. Every accepted entry goes through [`SaveStore::set`], then the
    /// store is flushed right away.
    pub async fn import(&self, document: &Value) -> Result<ImportReport> {
        let mut imported = 0;
        let mut skipped = 0;

        if let Some(saves) = document.get("saves").and_then(Value::as_array) {
            for save in saves {
                if self.import_entry(save) {
                    imported += 1;
                } else {
                    skipped += 1;
                }
            }
        } else if document.get("key").is_some() {
            if self.import_entry(document) {
                imported += 1;
            } else {
                skipped += 1;
            }
        } else {
            return Err(SaveError::InvalidImport(
                "expected a `saves` array or a `key`/`value` pair".to_string(),
            ));
        }

        let flushed = match self.save_now().await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "flush after import failed");
                false
            }
        };

        tracing::info!(imported, skipped, "import finished");
        Ok(ImportReport { imported, skipped, flushed })
    }

    /// Parse and import a backup document from JSON text
    pub async fn import_str(&self, text: &str) -> Result<ImportReport> {
        let document: Value = serde_json::from_str(text)?;
        self.import(&document).await
    }

    fn import_entry(&self, entry: &Value) -> bool {
        let key = match entry.get("key").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => key,
            _ => return false,
        };
        let Some(value) = entry.get("value") else {
            return false;
        };

        self.set(key, value.clone()).is_ok()
    }

    /// Summary statistics over every tracked save
    pub async fn stats(&self) -> SaveStats {
        let saves = self.collect_saves().await;
        let total_size_bytes = saves.iter().map(|sized| sized.size).sum();

        SaveStats {
            total_saves: saves.len(),
            total_size_bytes,
            total_size: format_bytes(total_size_bytes),
            platform: self.platform(),
            last_save: self.last_saved_at(),
        }
    }
}
