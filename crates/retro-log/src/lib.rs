//! The ordered log between the command side and the materializer.
//!
//! Records travel as serialized JSON, the same bytes an external broker would
//! carry: producer and consumer are independent and share only the wire
//! contract, so the consumer decodes tag-first and a malformed record is its
//! problem alone. Appends are keyed by board; the key picks a partition and
//! each partition is FIFO, so everything touching one board is consumed in
//! append order. This crate ships an in-process transport for single-node
//! deployments; a distributed setup would put a broker behind the same trait.

use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use retro_types::events::DbEvent;

/// Per-partition buffer before appends start waiting on backpressure.
pub const DEFAULT_PARTITION_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum LogError {
    /// The consumer side is gone; nothing will drain the partitions.
    #[error("event log closed")]
    Closed,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One keyed record as it sits on the log.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: Uuid,
    pub payload: Vec<u8>,
}

/// Producer half of the log.
///
/// An append may wait briefly on partition backpressure but never on
/// materializer progress; once it returns Ok the log has the record.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: DbEvent) -> Result<(), LogError>;
}

/// In-process partitioned transport.
///
/// `partition_key()` hashes to a fixed partition, so one board's events never
/// spread across independently-ordered partitions.
pub struct PartitionedLog {
    partitions: Vec<mpsc::Sender<Record>>,
}

impl PartitionedLog {
    /// Build the producer and its consumer half with default buffering.
    pub fn new(partitions: usize) -> (Self, LogConsumer) {
        Self::with_capacity(partitions, DEFAULT_PARTITION_CAPACITY)
    }

    pub fn with_capacity(partitions: usize, capacity: usize) -> (Self, LogConsumer) {
        let count = partitions.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            receivers.push(rx);
        }
        (
            Self { partitions: senders },
            LogConsumer {
                partitions: receivers,
            },
        )
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition_for(&self, key: Uuid) -> usize {
        let mut hasher = std::hash::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }
}

#[async_trait]
impl EventLog for PartitionedLog {
    async fn append(&self, event: DbEvent) -> Result<(), LogError> {
        let key = event.partition_key();
        let partition = self.partition_for(key);
        debug!(
            entity = event.entity.entity_name(),
            action = event.action.as_str(),
            partition,
            "appending event"
        );

        let record = Record {
            key,
            payload: serde_json::to_vec(&event)?,
        };
        self.partitions[partition]
            .send(record)
            .await
            .map_err(|_| LogError::Closed)
    }
}

/// Consumer half: one receiver per partition, each drained sequentially by a
/// single logical consumer group.
pub struct LogConsumer {
    pub partitions: Vec<mpsc::Receiver<Record>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_types::events::{BoardPayload, EntityPayload, EventAction};

    fn board_event(board_id: Uuid, title: &str) -> DbEvent {
        DbEvent::new(
            EventAction::Create,
            EntityPayload::Board(BoardPayload {
                id: board_id,
                title: title.into(),
                user_id: Uuid::new_v4(),
                is_progress: true,
                created_at: chrono::Utc::now(),
                ended_at: None,
                invite_edit_token: Uuid::new_v4(),
                editors_id: vec![],
            }),
        )
    }

    #[tokio::test]
    async fn one_board_stays_on_one_partition_in_order() {
        let (log, mut consumer) = PartitionedLog::with_capacity(4, 16);
        let board_id = Uuid::new_v4();

        for i in 0..5 {
            log.append(board_event(board_id, &format!("rev {i}"))).await.unwrap();
        }

        let mut seen = Vec::new();
        for rx in consumer.partitions.iter_mut() {
            while let Ok(record) = rx.try_recv() {
                assert_eq!(record.key, board_id);
                let event: DbEvent = serde_json::from_slice(&record.payload).unwrap();
                let EntityPayload::Board(b) = &event.entity else {
                    panic!("unexpected payload")
                };
                seen.push((b.id, b.title.clone()));
            }
        }

        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|(id, _)| *id == board_id));
        let titles: Vec<_> = seen.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(titles, vec!["rev 0", "rev 1", "rev 2", "rev 3", "rev 4"]);
    }

    #[tokio::test]
    async fn append_after_consumer_drop_surfaces_closed() {
        let (log, consumer) = PartitionedLog::with_capacity(1, 4);
        drop(consumer);

        let err = log.append(board_event(Uuid::new_v4(), "late")).await.unwrap_err();
        assert!(matches!(err, LogError::Closed));
    }
}
