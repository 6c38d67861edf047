use crate::common::{EventEnvelope, EventStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Fleet journal on disk, one `<aggregate_id>.jsonl` file per fleet with one
/// event envelope per line.
pub struct FileEventStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEventStore {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn journal_path(&self, aggregate_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", aggregate_id))
    }

    async fn read_journal(path: &PathBuf) -> Result<Vec<EventEnvelope>, String> {
        let file = File::open(path)
            .await
            .map_err(|e| format!("Failed to open journal {}: {}", path.display(), e))?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_number = 0u64;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| format!("Failed to read line: {}", e))?
        {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: EventEnvelope = serde_json::from_str(&line)
                .map_err(|e| format!("Failed to deserialize event at line {}: {}", line_number, e))?;
            events.push(event);
        }
        Ok(events)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append_events(&self, aggregate_id: &str, events: Vec<EventEnvelope>) -> Result<u64, String> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| format!("Failed to create journal directory: {}", e))?;

        let path = self.journal_path(aggregate_id);
        let mut buffer = String::new();
        for event in &events {
            let line = serde_json::to_string(event).map_err(|e| format!("Failed to serialize event: {}", e))?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("Failed to open journal {}: {}", path.display(), e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| format!("Failed to write events: {}", e))?;
        file.flush().await.map_err(|e| format!("Failed to flush journal: {}", e))?;

        Ok(Self::read_journal(&path).await?.len() as u64)
    }

    async fn load_events(&self, aggregate_id: &str, from_sequence: u64) -> Result<Vec<EventEnvelope>, String> {
        let path = self.journal_path(aggregate_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let events = Self::read_journal(&path).await?;
        Ok(events.into_iter().skip(from_sequence as usize).collect())
    }

    async fn load_events_by_type(
        &self,
        event_type: &str,
        from_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEnvelope>, String> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut dir = tokio::fs::read_dir(&self.base_path)
            .await
            .map_err(|e| format!("Failed to read directory: {}", e))?;

        let mut matching = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| format!("Failed to read directory entry: {}", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }
            matching.extend(
                Self::read_journal(&path)
                    .await?
                    .into_iter()
                    .filter(|event| event.event_type == event_type)
                    .filter(|event| from_timestamp.map_or(true, |from| event.occurred_at >= from)),
            );
        }
        matching.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(matching)
    }
}
