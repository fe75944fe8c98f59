use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use retro_db::Database;
use retro_db::models::{BoardRow, ComponentRow};
use retro_types::events::{
    BoardPayload, ComponentPayload, DbEvent, EntityPayload, EventAction, VotePayload,
};

/// Why one envelope could not be applied. Never fatal to the consumer loop.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// UPDATE (or a vote reference) pointed at a row that was never
    /// materialized, an ordering or loss anomaly. The store is left as-is.
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: Uuid },

    /// A combination the dispatch table has no handler for.
    #[error("no handler for {entity} {action}")]
    UnsupportedAction {
        entity: &'static str,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Total dispatch on `(entity, action)`. Every envelope the producer can emit
/// lands in exactly one arm; anything else is rejected for that message.
pub fn apply(db: &Database, event: &DbEvent) -> Result<(), ApplyError> {
    match (&event.entity, event.action) {
        (EntityPayload::Board(board), EventAction::Create) => board_create(db, board),
        (EntityPayload::Board(board), EventAction::Update) => board_update(db, board),
        (EntityPayload::Board(board), EventAction::Delete) => board_delete(db, board),
        (EntityPayload::Component(component), EventAction::Create) => {
            component_create(db, component)
        }
        (EntityPayload::Component(component), EventAction::Update) => {
            component_update(db, component)
        }
        (EntityPayload::Component(component), EventAction::Delete) => {
            component_delete(db, component)
        }
        (EntityPayload::Vote(vote), EventAction::Create) => vote_create(db, vote),
        (EntityPayload::Vote(vote), EventAction::Delete) => vote_delete(db, vote),
        (EntityPayload::Vote(_), EventAction::Update) => Err(ApplyError::UnsupportedAction {
            entity: "Vote",
            action: event.action.as_str(),
        }),
    }
}

fn board_row(board: &BoardPayload) -> BoardRow {
    BoardRow {
        id: board.id.to_string(),
        title: board.title.clone(),
        author_id: board.user_id.to_string(),
        is_progress: board.is_progress,
        created_at: board.created_at.to_rfc3339(),
        ended_at: board.ended_at.map(|t| t.to_rfc3339()),
        invite_edit_token: board.invite_edit_token.to_string(),
    }
}

fn editor_ids(board: &BoardPayload) -> Vec<String> {
    board.editors_id.iter().map(Uuid::to_string).collect()
}

fn board_create(db: &Database, board: &BoardPayload) -> Result<(), ApplyError> {
    db.upsert_board(&board_row(board))?;
    db.replace_board_editors(&board.id.to_string(), &editor_ids(board))?;
    info!("Board saved: {}", board.id);
    Ok(())
}

fn board_update(db: &Database, board: &BoardPayload) -> Result<(), ApplyError> {
    let changed = db.update_board(
        &board.id.to_string(),
        &board.title,
        board.is_progress,
        board.ended_at.map(|t| t.to_rfc3339()).as_deref(),
        &board.invite_edit_token.to_string(),
    )?;
    if !changed {
        return Err(ApplyError::Missing {
            entity: "Board",
            id: board.id,
        });
    }
    db.replace_board_editors(&board.id.to_string(), &editor_ids(board))?;
    info!("Board updated: {}", board.id);
    Ok(())
}

fn board_delete(db: &Database, board: &BoardPayload) -> Result<(), ApplyError> {
    let deleted = db.delete_board(&board.id.to_string())?;
    if deleted > 0 {
        info!("Board deleted: {}", board.id);
    }
    Ok(())
}

fn component_row(component: &ComponentPayload) -> ComponentRow {
    ComponentRow {
        id: component.id.to_string(),
        title: component.title.clone(),
        description: component.description.clone(),
        kind: component.kind.as_str().to_string(),
        x: component.x,
        y: component.y,
        board_id: component.board_id.to_string(),
        author_id: component.author_id.to_string(),
        is_anonymous_author: component.is_anonymous_author,
        is_anonymous_votes: component.is_anonymous_votes,
        count_votes: 0,
    }
}

fn component_create(db: &Database, component: &ComponentPayload) -> Result<(), ApplyError> {
    db.upsert_component(&component_row(component))?;
    info!("Component saved: {}", component.id);
    Ok(())
}

fn component_update(db: &Database, component: &ComponentPayload) -> Result<(), ApplyError> {
    let changed = db.update_component(
        &component.id.to_string(),
        &component.title,
        component.description.as_deref(),
        component.x,
        component.y,
        component.is_anonymous_author,
        component.is_anonymous_votes,
    )?;
    if !changed {
        return Err(ApplyError::Missing {
            entity: "Component",
            id: component.id,
        });
    }
    info!("Component updated: {}", component.id);
    Ok(())
}

fn component_delete(db: &Database, component: &ComponentPayload) -> Result<(), ApplyError> {
    let deleted = db.delete_component(&component.id.to_string())?;
    if deleted > 0 {
        info!("Component deleted: {}", component.id);
    }
    Ok(())
}

fn vote_create(db: &Database, vote: &VotePayload) -> Result<(), ApplyError> {
    // References resolve here, not at emission; the payload carries ids only.
    if !db.user_exists(&vote.user_id.to_string())? {
        return Err(ApplyError::Missing {
            entity: "User",
            id: vote.user_id,
        });
    }
    if !db.component_exists(&vote.component_id.to_string())? {
        return Err(ApplyError::Missing {
            entity: "Component",
            id: vote.component_id,
        });
    }

    let inserted = db.insert_vote(&vote.component_id.to_string(), &vote.user_id.to_string())?;
    if inserted {
        info!("Vote saved: user={} component={}", vote.user_id, vote.component_id);
    }
    Ok(())
}

fn vote_delete(db: &Database, vote: &VotePayload) -> Result<(), ApplyError> {
    let deleted = db.delete_vote(&vote.component_id.to_string(), &vote.user_id.to_string())?;
    if deleted > 0 {
        info!(
            "Vote deleted: user={} component={}",
            vote.user_id, vote.component_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_types::models::ComponentType;

    fn db_with_user(user_id: Uuid) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user_id.to_string(), "alice", &format!("alice-{user_id}"), "hash")
            .unwrap();
        db
    }

    fn board_payload(id: Uuid, author: Uuid) -> BoardPayload {
        BoardPayload {
            id,
            title: "Sprint Retro".into(),
            user_id: author,
            is_progress: true,
            created_at: chrono::Utc::now(),
            ended_at: None,
            invite_edit_token: Uuid::new_v4(),
            editors_id: vec![],
        }
    }

    fn component_payload(id: Uuid, board_id: Uuid, author: Uuid) -> ComponentPayload {
        ComponentPayload {
            id,
            title: "went well".into(),
            description: Some("ship it".into()),
            kind: ComponentType::Note,
            x: 0.1,
            y: 0.9,
            board_id,
            author_id: author,
            is_anonymous_author: false,
            is_anonymous_votes: false,
        }
    }

    fn create(entity: EntityPayload) -> DbEvent {
        DbEvent::new(EventAction::Create, entity)
    }

    #[test]
    fn replayed_create_materializes_one_row() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let event = create(EntityPayload::Board(board_payload(Uuid::new_v4(), author)));

        apply(&db, &event).unwrap();
        apply(&db, &event).unwrap();

        assert_eq!(db.get_boards_by_author(&author.to_string()).unwrap().len(), 1);
    }

    #[test]
    fn update_of_missing_board_leaves_store_unchanged() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let event = DbEvent::new(
            EventAction::Update,
            EntityPayload::Board(board_payload(Uuid::new_v4(), author)),
        );

        let err = apply(&db, &event).unwrap_err();
        assert!(matches!(err, ApplyError::Missing { entity: "Board", .. }));
        assert!(db.get_boards_by_author(&author.to_string()).unwrap().is_empty());
    }

    #[test]
    fn delete_of_absent_component_is_noop() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let event = DbEvent::new(
            EventAction::Delete,
            EntityPayload::Component(component_payload(Uuid::new_v4(), Uuid::new_v4(), author)),
        );

        apply(&db, &event).unwrap();
    }

    #[test]
    fn editor_update_applied_twice_keeps_membership_once() {
        let author = Uuid::new_v4();
        let editor = Uuid::new_v4();
        let db = db_with_user(author);
        db.create_user(&editor.to_string(), "bob", "bob", "hash").unwrap();

        let board_id = Uuid::new_v4();
        apply(&db, &create(EntityPayload::Board(board_payload(board_id, author)))).unwrap();

        let mut updated = board_payload(board_id, author);
        updated.editors_id = vec![editor];
        let event = DbEvent::new(EventAction::Update, EntityPayload::Board(updated));

        apply(&db, &event).unwrap();
        apply(&db, &event).unwrap();

        assert_eq!(
            db.get_board_editor_ids(&board_id.to_string()).unwrap(),
            vec![editor.to_string()]
        );
    }

    #[test]
    fn vote_add_then_remove_is_net_zero() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let board_id = Uuid::new_v4();
        let component_id = Uuid::new_v4();
        apply(&db, &create(EntityPayload::Board(board_payload(board_id, author)))).unwrap();
        apply(
            &db,
            &create(EntityPayload::Component(component_payload(component_id, board_id, author))),
        )
        .unwrap();

        let vote = VotePayload {
            user_id: author,
            component_id,
        };
        apply(&db, &create(EntityPayload::Vote(vote.clone()))).unwrap();
        apply(&db, &DbEvent::new(EventAction::Delete, EntityPayload::Vote(vote))).unwrap();

        assert_eq!(db.count_votes(&component_id.to_string()).unwrap(), 0);
    }

    #[test]
    fn vote_for_unmaterialized_component_is_an_anomaly() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let vote = VotePayload {
            user_id: author,
            component_id: Uuid::new_v4(),
        };

        let err = apply(&db, &create(EntityPayload::Vote(vote.clone()))).unwrap_err();
        assert!(matches!(err, ApplyError::Missing { entity: "Component", .. }));
        assert_eq!(db.count_votes(&vote.component_id.to_string()).unwrap(), 0);
    }

    #[test]
    fn vote_update_has_no_handler() {
        let author = Uuid::new_v4();
        let db = db_with_user(author);
        let event = DbEvent::new(
            EventAction::Update,
            EntityPayload::Vote(VotePayload {
                user_id: author,
                component_id: Uuid::new_v4(),
            }),
        );

        let err = apply(&db, &event).unwrap_err();
        assert!(matches!(err, ApplyError::UnsupportedAction { entity: "Vote", .. }));
    }
}
