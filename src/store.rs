use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    sync::Mutex,
};

use crate::{
    errors::StoreError,
    types::{ChatMessage, ChatRecord},
};

const KEY_PREFIX: &str = "chat_";
const RECORD_VERSION: u32 = 2;

/// Raw string key/value storage underneath the history store.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Vec<String>;
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        match self.entries.lock() {
            Ok(entries) => entries.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// One row per key in a local SQLite database. A damaged value only ever
/// affects its own key.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS chat_history (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KvBackend for SqliteBackend {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().ok()?;
        conn.query_row(
            "SELECT value FROM chat_history WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .unwrap_or_else(|err| {
            tracing::warn!("Failed to read '{}': {}", key, err);
            None
        })
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO chat_history (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute("DELETE FROM chat_history WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let Ok(conn) = self.conn.lock() else {
            return Vec::new();
        };
        let keys = conn
            .prepare("SELECT key FROM chat_history ORDER BY key")
            .and_then(|mut stmt| {
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            });
        keys.unwrap_or_else(|err| {
            tracing::warn!("Failed to list history keys: {}", err);
            Vec::new()
        })
    }
}

/// Stored shapes, decoded once here and nowhere else.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Versioned {
        #[serde(default = "unversioned")]
        version: u32,
        #[serde(default)]
        messages: Vec<ChatMessage>,
        #[serde(default)]
        collection_name: Option<String>,
    },
    Legacy(Vec<ChatMessage>),
}

// Object records written before the version field existed.
fn unversioned() -> u32 {
    RECORD_VERSION
}

#[derive(Serialize)]
struct StoredRecordRef<'a> {
    version: u32,
    messages: &'a [ChatMessage],
    collection_name: Option<&'a str>,
}

fn decode(key: &str, raw: &str) -> Option<ChatRecord> {
    match serde_json::from_str::<StoredRecord>(raw) {
        Ok(StoredRecord::Versioned {
            version,
            messages,
            collection_name,
        }) => {
            if version > RECORD_VERSION {
                tracing::warn!("Ignoring '{}' stored with unknown version {}", key, version);
                return None;
            }
            Some(ChatRecord {
                messages,
                collection_name,
            })
        }
        Ok(StoredRecord::Legacy(messages)) => {
            tracing::debug!("Upgrading legacy record '{}'", key);
            Some(ChatRecord {
                messages,
                collection_name: None,
            })
        }
        Err(err) => {
            tracing::warn!("Ignoring corrupt record '{}': {}", key, err);
            None
        }
    }
}

fn key_for(display_name: &str) -> String {
    format!("{}{}", KEY_PREFIX, display_name)
}

/// Conversation logs keyed by document display name.
pub struct HistoryStore {
    backend: Box<dyn KvBackend>,
}

impl HistoryStore {
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Never fails: absent, corrupt and unknown records all load as empty.
    pub fn load(&self, display_name: &str) -> ChatRecord {
        let key = key_for(display_name);
        self.backend
            .get(&key)
            .and_then(|raw| decode(&key, &raw))
            .unwrap_or_default()
    }

    pub fn save(
        &self,
        display_name: &str,
        messages: &[ChatMessage],
        collection_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_string(&StoredRecordRef {
            version: RECORD_VERSION,
            messages,
            collection_name,
        })?;
        self.backend.set(&key_for(display_name), value)
    }

    pub fn remove(&self, display_name: &str) -> Result<(), StoreError> {
        self.backend.remove(&key_for(display_name))
    }

    /// Display names that have a record, whatever its state.
    pub fn list_known_names(&self) -> BTreeSet<String> {
        self.backend
            .keys()
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect()
    }

    pub fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }
}
