/// Raw rows as stored. Ids and timestamps stay TEXT here; the API layer
/// converts them to typed values when building responses.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub nickname: String,
    pub login: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BoardRow {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub is_progress: bool,
    pub created_at: String,
    pub ended_at: Option<String>,
    pub invite_edit_token: String,
}

#[derive(Debug, Clone)]
pub struct ComponentRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub board_id: String,
    pub author_id: String,
    pub is_anonymous_author: bool,
    pub is_anonymous_votes: bool,
    pub count_votes: i64,
}
