use crate::common::{EventEnvelope, EventStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory fleet journal for tests and short runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, aggregate_id: &str) -> usize {
        self.events.read().await.get(aggregate_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_events(&self, aggregate_id: &str, events: Vec<EventEnvelope>) -> Result<u64, String> {
        let mut store = self.events.write().await;
        let journal = store.entry(aggregate_id.to_string()).or_default();
        journal.extend(events);
        Ok(journal.len() as u64)
    }

    async fn load_events(&self, aggregate_id: &str, from_sequence: u64) -> Result<Vec<EventEnvelope>, String> {
        let store = self.events.read().await;
        Ok(store
            .get(aggregate_id)
            .map(|events| events.iter().skip(from_sequence as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn load_events_by_type(
        &self,
        event_type: &str,
        from_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<EventEnvelope>, String> {
        let store = self.events.read().await;
        let mut matching: Vec<EventEnvelope> = store
            .values()
            .flatten()
            .filter(|event| event.event_type == event_type)
            .filter(|event| from_timestamp.map_or(true, |from| event.occurred_at >= from))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(matching)
    }
}
