use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ComponentType;

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the SSE endpoint.
/// Canonical definition lives here so both crates agree on the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub login: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub nickname: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub nickname: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub nickname: String,
    pub login: String,
}

// -- Boards --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardResponse {
    pub id: Uuid,
    pub title: String,
    /// Absent if the author account no longer resolves.
    pub author: Option<UserResponse>,
    pub is_progress: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Invite token as its own body so the rotate and join endpoints share it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardInviteToken {
    pub token: Uuid,
}

// -- Components --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub x: f32,
    pub y: f32,
    pub is_anonymous_author: bool,
    pub is_anonymous_votes: bool,
}

/// Partial edit: absent fields keep their current value.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentEditRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Hidden when the component was posted anonymously.
    pub author: Option<UserResponse>,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    pub x: f32,
    pub y: f32,
    pub is_anonymous_author: bool,
    pub is_anonymous_votes: bool,
    pub count_votes: i64,
}

// -- Votes --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub component_id: Uuid,
}
