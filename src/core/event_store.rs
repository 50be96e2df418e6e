//! Append-only instance history with file-based persistence.
//!
//! Each instance gets its own directory holding a newline-delimited JSON
//! (JSONL) history, so instances never share mutable state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::Event;

const HISTORY_FILE: &str = "history.jsonl";

/// File-based history store for one instance
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Path to the history.jsonl file
    history_path: PathBuf,
}

impl EventStore {
    /// Create or open the history of an instance under `root`
    pub async fn open(root: &Path, instance_id: Uuid) -> Result<Self> {
        let instance_dir = root.join(instance_id.to_string());

        fs::create_dir_all(&instance_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create instance directory: {}",
                    instance_dir.display()
                )
            })?;

        Ok(Self::at(instance_dir))
    }

    /// Open the history of an instance only if it already exists
    pub async fn existing(root: &Path, instance_id: Uuid) -> Result<Option<Self>> {
        let instance_dir = root.join(instance_id.to_string());

        if !fs::try_exists(&instance_dir).await.with_context(|| {
            format!("Failed to inspect instance directory: {}", instance_dir.display())
        })? {
            return Ok(None);
        }

        Ok(Some(Self::at(instance_dir)))
    }

    fn at(instance_dir: PathBuf) -> Self {
        Self {
            history_path: instance_dir.join(HISTORY_FILE),
        }
    }

    /// Append an event to the history
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open history file: {}",
                    self.history_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !fs::try_exists(&self.history_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let file = File::open(&self.history_path).await.with_context(|| {
            format!(
                "Failed to open history file: {}",
                self.history_path.display()
            )
        })?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List all instance IDs under `root`
    pub async fn list_instances(root: &Path) -> Result<Vec<Uuid>> {
        if !fs::try_exists(root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut instances = Vec::new();
        let mut entries = fs::read_dir(root)
            .await
            .with_context(|| format!("Failed to read instances directory: {}", root.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        instances.push(uuid);
                    }
                }
            }
        }

        Ok(instances)
    }
}

/// Generate an idempotency key for an activity call
pub fn generate_idempotency_key(instance_id: Uuid, seq: u32, activity: &str, input: &str) -> String {
    format!("{}:{}:{}:{}", instance_id, seq, activity, hash_input(input))
}

/// Hash input content (first 16 hex chars of SHA256)
pub fn hash_input(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let instance_id = Uuid::new_v4();
        let store = EventStore::open(temp.path(), instance_id).await.unwrap();

        let started = Event::new(instance_id, EventType::InstanceStarted, Utc::now())
            .with_name("hello_sequence");
        let timer = Event::new(instance_id, EventType::TimerCreated, Utc::now())
            .with_seq(0)
            .with_fire_at(Utc::now());

        store.append(&started).await.unwrap();
        store.append(&timer).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events, vec![started, timer]);
    }

    #[tokio::test]
    async fn test_replay_of_missing_history_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = EventStore::open(temp.path(), Uuid::new_v4()).await.unwrap();

        assert!(store.replay().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_does_not_create() {
        let temp = TempDir::new().unwrap();
        let instance_id = Uuid::new_v4();

        assert!(EventStore::existing(temp.path(), instance_id)
            .await
            .unwrap()
            .is_none());
        assert!(!temp.path().join(instance_id.to_string()).exists());

        EventStore::open(temp.path(), instance_id).await.unwrap();
        assert!(EventStore::existing(temp.path(), instance_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_list_instances_ignores_foreign_entries() {
        let temp = TempDir::new().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        EventStore::open(temp.path(), a).await.unwrap();
        EventStore::open(temp.path(), b).await.unwrap();
        std::fs::create_dir_all(temp.path().join("not-a-uuid")).unwrap();
        std::fs::write(temp.path().join("stray.txt"), "x").unwrap();

        let mut listed = EventStore::list_instances(temp.path()).await.unwrap();
        listed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[test]
    fn test_idempotency_key_format() {
        let instance_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let key = generate_idempotency_key(instance_id, 2, "say_hello", "Seattle");

        assert!(key.starts_with("550e8400-e29b-41d4-a716-446655440000:2:say_hello:"));
        let hash = key.rsplit(':').next().unwrap();
        assert_eq!(hash.len(), 16);
    }

    #[test]
    fn test_input_hash_consistency() {
        assert_eq!(hash_input("Tokyo"), hash_input("Tokyo"));
        assert_ne!(hash_input("Tokyo"), hash_input("London"));
        assert_eq!(hash_input("Tokyo").len(), 16);
    }
}
