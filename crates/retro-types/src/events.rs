use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ComponentType;

/// Mutation kind carried on the `db-event` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Flat, id-carrying projection of a board at mutation time.
///
/// Producer and consumer are independent processes; the payload carries only
/// scalars and foreign-key ids, never live object graphs. Field names are the
/// camelCase wire contract shared with any other consumer of the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPayload {
    pub id: Uuid,
    pub title: String,
    /// Author id.
    pub user_id: Uuid,
    pub is_progress: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub invite_edit_token: Uuid,
    /// Editor membership as ids only; the materializer resolves them.
    pub editors_id: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPayload {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub x: f32,
    pub y: f32,
    pub board_id: Uuid,
    pub author_id: Uuid,
    pub is_anonymous_author: bool,
    pub is_anonymous_votes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub user_id: Uuid,
    pub component_id: Uuid,
}

/// Entity tag plus the payload schema bound to it.
///
/// The tag is read first on the consuming side and fully determines how the
/// payload parses; an unknown tag fails the decode of that message only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "payload")]
pub enum EntityPayload {
    Board(BoardPayload),
    Component(ComponentPayload),
    Vote(VotePayload),
}

impl EntityPayload {
    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::Board(_) => "Board",
            Self::Component(_) => "Component",
            Self::Vote(_) => "Vote",
        }
    }
}

/// One message on the `db-event` log: `{ "entity", "action", "payload" }`.
///
/// Every mutation the command side accepts maps to exactly one of these; the
/// log carries no other shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbEvent {
    pub action: EventAction,
    #[serde(flatten)]
    pub entity: EntityPayload,
}

impl DbEvent {
    pub fn new(action: EventAction, entity: EntityPayload) -> Self {
        Self { action, entity }
    }

    /// Ordering key for the log: everything touching one board shares a key,
    /// so a partitioned transport keeps that board's events in append order.
    /// Votes key by component id; a vote command is only accepted once its
    /// component is readable, so component-before-vote order already holds.
    pub fn partition_key(&self) -> Uuid {
        match &self.entity {
            EntityPayload::Board(b) => b.id,
            EntityPayload::Component(c) => c.board_id,
            EntityPayload::Vote(v) => v.component_id,
        }
    }
}

/// One message on a board's push stream; `data` mirrors the JSON body the
/// corresponding REST endpoint returns.
#[derive(Debug, Clone, Serialize)]
pub struct BoardStreamEvent {
    pub entity: &'static str,
    pub action: EventAction,
    pub data: serde_json::Value,
}

impl BoardStreamEvent {
    pub fn new<T: Serialize>(
        entity: &'static str,
        action: EventAction,
        data: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            entity,
            action,
            data: serde_json::to_value(data)?,
        })
    }
}
