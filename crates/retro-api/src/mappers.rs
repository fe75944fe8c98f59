//! Row → response and row → log-payload conversions.
//!
//! Rows keep ids and timestamps as TEXT; everything typed happens here, with
//! corrupt values logged and defaulted rather than failing the whole request.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use retro_db::models::{BoardRow, ComponentRow, UserRow};
use retro_types::api::{BoardResponse, ComponentResponse, UserResponse};
use retro_types::events::{BoardPayload, ComponentPayload};
use retro_types::models::ComponentType;

pub fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' in {}: {}", raw, context, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' in {}: {}", raw, context, e);
        DateTime::default()
    })
}

pub fn parse_component_type(raw: &str, context: &str) -> ComponentType {
    ComponentType::parse(raw).unwrap_or_else(|| {
        warn!("Unknown component type '{}' in {}", raw, context);
        ComponentType::Note
    })
}

pub fn user_response(user: &UserRow) -> UserResponse {
    UserResponse {
        id: parse_uuid(&user.id, "user row"),
        nickname: user.nickname.clone(),
        login: user.login.clone(),
    }
}

pub fn board_response(board: &BoardRow, author: Option<&UserRow>) -> BoardResponse {
    BoardResponse {
        id: parse_uuid(&board.id, "board row"),
        title: board.title.clone(),
        author: author.map(user_response),
        is_progress: board.is_progress,
        created_at: parse_timestamp(&board.created_at, "board row"),
        ended_at: board
            .ended_at
            .as_deref()
            .map(|t| parse_timestamp(t, "board row")),
    }
}

/// Author is withheld from the response when the component is anonymous; the
/// log payload still carries the real id for the store.
pub fn component_response(component: &ComponentRow, author: Option<&UserRow>) -> ComponentResponse {
    ComponentResponse {
        id: parse_uuid(&component.id, "component row"),
        title: component.title.clone(),
        description: component.description.clone(),
        author: if component.is_anonymous_author {
            None
        } else {
            author.map(user_response)
        },
        kind: parse_component_type(&component.kind, "component row"),
        x: component.x,
        y: component.y,
        is_anonymous_author: component.is_anonymous_author,
        is_anonymous_votes: component.is_anonymous_votes,
        count_votes: component.count_votes,
    }
}

pub fn board_payload(board: &BoardRow, editor_ids: &[String]) -> BoardPayload {
    BoardPayload {
        id: parse_uuid(&board.id, "board row"),
        title: board.title.clone(),
        user_id: parse_uuid(&board.author_id, "board row"),
        is_progress: board.is_progress,
        created_at: parse_timestamp(&board.created_at, "board row"),
        ended_at: board
            .ended_at
            .as_deref()
            .map(|t| parse_timestamp(t, "board row")),
        invite_edit_token: parse_uuid(&board.invite_edit_token, "board row"),
        editors_id: editor_ids
            .iter()
            .map(|id| parse_uuid(id, "board editors"))
            .collect(),
    }
}

pub fn component_payload(component: &ComponentRow) -> ComponentPayload {
    ComponentPayload {
        id: parse_uuid(&component.id, "component row"),
        title: component.title.clone(),
        description: component.description.clone(),
        kind: parse_component_type(&component.kind, "component row"),
        x: component.x,
        y: component.y,
        board_id: parse_uuid(&component.board_id, "component row"),
        author_id: parse_uuid(&component.author_id, "component row"),
        is_anonymous_author: component.is_anonymous_author,
        is_anonymous_votes: component.is_anonymous_votes,
    }
}
