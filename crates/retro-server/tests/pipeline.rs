//! End-to-end pipeline: command acceptance → immediate broadcast →
//! asynchronous materialization into the store.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use retro_broadcast::BroadcastRegistry;
use retro_db::Database;
use retro_log::{EventLog, PartitionedLog};
use retro_types::events::{
    BoardPayload, BoardStreamEvent, DbEvent, EntityPayload, EventAction,
};

fn board_payload(board_id: Uuid, author: Uuid, title: &str) -> BoardPayload {
    BoardPayload {
        id: board_id,
        title: title.into(),
        user_id: author,
        is_progress: true,
        created_at: chrono::Utc::now(),
        ended_at: None,
        invite_edit_token: Uuid::new_v4(),
        editors_id: vec![],
    }
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn viewer_sees_the_board_before_the_store_does() {
    let author = Uuid::new_v4();
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_user(&author.to_string(), "alice", "alice", "hash").unwrap();

    let registry = BroadcastRegistry::new();
    let (log, consumer) = PartitionedLog::with_capacity(4, 64);

    // A viewer is already on the board's push stream.
    let board_id = Uuid::new_v4();
    let mut viewer = registry.subscribe(board_id).await;

    // The command side accepts "create board": one envelope to the log, the
    // same view pushed to the broadcast group, response returned.
    let payload = board_payload(board_id, author, "Sprint Retro");
    log.append(DbEvent::new(
        EventAction::Create,
        EntityPayload::Board(payload.clone()),
    ))
    .await
    .unwrap();
    registry
        .publish(
            board_id,
            BoardStreamEvent::new(
                "Board",
                EventAction::Create,
                &serde_json::json!({ "id": board_id, "title": "Sprint Retro" }),
            )
            .unwrap(),
        )
        .await;

    // The push arrives while the store still knows nothing: the
    // eventual-consistency window is observable.
    let pushed = viewer.receiver.recv().await.unwrap();
    assert_eq!(pushed.entity, "Board");
    assert_eq!(pushed.action, EventAction::Create);
    assert_eq!(pushed.data["title"], "Sprint Retro");
    assert!(db.get_board(&board_id.to_string()).unwrap().is_none());

    // Once the materializer drains the log, the same title is durable.
    let handles = retro_materializer::spawn(consumer, db.clone());
    let db_check = db.clone();
    let bid = board_id.to_string();
    wait_for("board to materialize", move || {
        db_check.get_board(&bid).unwrap().is_some()
    })
    .await;

    let row = db.get_board(&board_id.to_string()).unwrap().unwrap();
    assert_eq!(row.title, "Sprint Retro");

    drop(log);
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn racing_editor_joins_materialize_as_one_membership() {
    let author = Uuid::new_v4();
    let editor = Uuid::new_v4();
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_user(&author.to_string(), "alice", "alice", "hash").unwrap();
    db.create_user(&editor.to_string(), "bob", "bob", "hash").unwrap();

    let (log, consumer) = PartitionedLog::with_capacity(4, 64);
    let board_id = Uuid::new_v4();

    log.append(DbEvent::new(
        EventAction::Create,
        EntityPayload::Board(board_payload(board_id, author, "Planning")),
    ))
    .await
    .unwrap();

    // Two concurrent join-by-invite commands both saw the board without the
    // new editor and both emitted the same post-mutation view.
    for _ in 0..2 {
        let mut joined = board_payload(board_id, author, "Planning");
        joined.editors_id = vec![editor];
        log.append(DbEvent::new(EventAction::Update, EntityPayload::Board(joined)))
            .await
            .unwrap();
    }

    let handles = retro_materializer::spawn(consumer, db.clone());
    let db_check = db.clone();
    let bid = board_id.to_string();
    wait_for("editor to materialize", move || {
        !db_check.get_board_editor_ids(&bid).unwrap().is_empty()
    })
    .await;

    drop(log);
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        db.get_board_editor_ids(&board_id.to_string()).unwrap(),
        vec![editor.to_string()]
    );
}
