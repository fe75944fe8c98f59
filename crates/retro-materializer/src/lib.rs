//! The single logical consumer group of the `db-event` log, and the sole
//! writer of the persistent store.

pub mod apply;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use retro_db::Database;
use retro_log::{LogConsumer, Record};
use retro_types::events::DbEvent;

/// Spawn one task per log partition. Each task drains its partition strictly
/// in order; partitions advance independently of each other.
pub fn spawn(consumer: LogConsumer, db: Arc<Database>) -> Vec<JoinHandle<()>> {
    consumer
        .partitions
        .into_iter()
        .enumerate()
        .map(|(partition, rx)| {
            let db = db.clone();
            tokio::spawn(run_partition(partition, rx, db))
        })
        .collect()
}

/// One record at a time. A record that fails to decode or to apply is logged
/// with its context and the loop moves on; one bad message never stalls the
/// partition.
async fn run_partition(partition: usize, mut rx: mpsc::Receiver<Record>, db: Arc<Database>) {
    info!(partition, "materializer partition consumer started");

    while let Some(record) = rx.recv().await {
        // The entity tag decides the payload schema; nothing about the
        // producer's runtime is trusted beyond the bytes themselves.
        let event: DbEvent = match serde_json::from_slice(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                error!("Failed to deserialize record for key {}: {}", record.key, e);
                continue;
            }
        };

        let entity = event.entity.entity_name();
        let action = event.action.as_str();
        info!("Received event: action={}, entity={}", action, entity);

        let db = db.clone();
        match tokio::task::spawn_blocking(move || apply::apply(&db, &event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(
                    "Error processing event: action={}, entity={}, error={}",
                    action, entity, e
                );
            }
            Err(e) => {
                error!("apply task join error: {}", e);
            }
        }
    }

    info!(partition, "log partition closed, consumer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_log::{EventLog, PartitionedLog};
    use retro_types::events::{BoardPayload, EntityPayload, EventAction};
    use std::time::Duration;
    use uuid::Uuid;

    fn board_payload(id: Uuid, author: Uuid, title: &str) -> BoardPayload {
        BoardPayload {
            id,
            title: title.into(),
            user_id: author,
            is_progress: true,
            created_at: chrono::Utc::now(),
            ended_at: None,
            invite_edit_token: Uuid::new_v4(),
            editors_id: vec![],
        }
    }

    async fn wait_for_board(db: &Database, board_id: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while db.get_board(board_id).unwrap().is_none() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "board never materialized"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn consumer_survives_a_failing_envelope() {
        let author = Uuid::new_v4();
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user(&author.to_string(), "alice", "alice", "hash").unwrap();

        let (log, consumer) = PartitionedLog::with_capacity(1, 16);
        let handles = spawn(consumer, db.clone());

        // An update for a board that was never created fails to apply...
        log.append(DbEvent::new(
            EventAction::Update,
            EntityPayload::Board(board_payload(Uuid::new_v4(), author, "ghost")),
        ))
        .await
        .unwrap();

        // ...and the next envelope still materializes.
        let board_id = Uuid::new_v4();
        log.append(DbEvent::new(
            EventAction::Create,
            EntityPayload::Board(board_payload(board_id, author, "alive")),
        ))
        .await
        .unwrap();

        wait_for_board(&db, &board_id.to_string()).await;

        let boards = db.get_boards_by_author(&author.to_string()).unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].title, "alive");

        drop(log);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn undecodable_record_is_dropped_and_the_stream_continues() {
        let author = Uuid::new_v4();
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user(&author.to_string(), "alice", "alice", "hash").unwrap();

        // Drive the partition directly, the way a foreign producer could:
        // an unknown entity tag, then garbage bytes, then a valid record.
        let (tx, rx) = mpsc::channel::<Record>(16);
        let handles = spawn(LogConsumer { partitions: vec![rx] }, db.clone());

        tx.send(Record {
            key: Uuid::new_v4(),
            payload: br#"{"entity":"SvgTemplate","action":"CREATE","payload":{}}"#.to_vec(),
        })
        .await
        .unwrap();
        tx.send(Record {
            key: Uuid::new_v4(),
            payload: b"not json at all".to_vec(),
        })
        .await
        .unwrap();

        let board_id = Uuid::new_v4();
        let valid = DbEvent::new(
            EventAction::Create,
            EntityPayload::Board(board_payload(board_id, author, "alive")),
        );
        tx.send(Record {
            key: valid.partition_key(),
            payload: serde_json::to_vec(&valid).unwrap(),
        })
        .await
        .unwrap();

        wait_for_board(&db, &board_id.to_string()).await;

        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
