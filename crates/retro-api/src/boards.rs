use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use retro_types::api::{BoardInviteToken, BoardRequest, Claims, ComponentRequest};
use retro_types::events::{
    BoardPayload, ComponentPayload, DbEvent, EntityPayload, EventAction,
};

use crate::emit::{emit, join_error, publish};
use crate::mappers;
use crate::state::AppState;

pub async fn create_board(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BoardRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.title.trim().is_empty() || req.title.len() > 255 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let author_id = claims.sub.to_string();
    let author = tokio::task::spawn_blocking(move || db.get_user_by_id(&author_id))
        .await
        .map_err(join_error)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let board_id = Uuid::new_v4();
    let invite_token = Uuid::new_v4();
    let now = Utc::now();

    emit(
        &state,
        DbEvent::new(
            EventAction::Create,
            EntityPayload::Board(BoardPayload {
                id: board_id,
                title: req.title.clone(),
                user_id: claims.sub,
                is_progress: true,
                created_at: now,
                ended_at: None,
                invite_edit_token: invite_token,
                editors_id: vec![],
            }),
        ),
    )
    .await?;

    let response = retro_types::api::BoardResponse {
        id: board_id,
        title: req.title,
        author: Some(mappers::user_response(&author)),
        is_progress: true,
        created_at: now,
        ended_at: None,
    };

    publish(&state, board_id, "Board", EventAction::Create, &response).await;

    info!("Board created: {} by {}", board_id, claims.sub);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let (board, author) = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&board_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let author = db
            .get_user_by_id(&board.author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((board, author))
    })
    .await
    .map_err(join_error)??;

    Ok(Json(mappers::board_response(&board, author.as_ref())))
}

pub async fn my_boards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let author_id = claims.sub.to_string();
    let (boards, author) = tokio::task::spawn_blocking(move || {
        let boards = db
            .get_boards_by_author(&author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let author = db
            .get_user_by_id(&author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((boards, author))
    })
    .await
    .map_err(join_error)??;

    let responses: Vec<_> = boards
        .iter()
        .map(|board| mappers::board_response(board, author.as_ref()))
        .collect();

    Ok(Json(responses))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let found = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&board_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        match board {
            Some(board) => {
                let editors = db
                    .get_board_editor_ids(&board.id)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                let author = db
                    .get_user_by_id(&board.author_id)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
                Ok::<_, StatusCode>(Some((board, editors, author)))
            }
            None => Ok(None),
        }
    })
    .await
    .map_err(join_error)??;

    // Nothing to delete: already-deleted boards report success.
    let Some((board, editors, author)) = found else {
        info!("Board {} not found, nothing to delete", id);
        return Ok(StatusCode::NO_CONTENT);
    };

    if board.author_id != claims.sub.to_string() {
        warn!("User {} is forbidden to delete board {}", claims.sub, id);
        return Err(StatusCode::FORBIDDEN);
    }

    emit(
        &state,
        DbEvent::new(
            EventAction::Delete,
            EntityPayload::Board(mappers::board_payload(&board, &editors)),
        ),
    )
    .await?;

    let response = mappers::board_response(&board, author.as_ref());
    publish(&state, id, "Board", EventAction::Delete, &response).await;

    info!("Board deleted: {} by {}", id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_invite_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let board = tokio::task::spawn_blocking(move || db.get_board(&board_id))
        .await
        .map_err(join_error)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if board.author_id != claims.sub.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(Json(BoardInviteToken {
        token: mappers::parse_uuid(&board.invite_edit_token, "board row"),
    }))
}

/// Rotating the token invalidates the previous one. The new token goes only
/// to the author in the response and is never broadcast.
pub async fn rotate_invite_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let (board, editors) = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&board_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let editors = db
            .get_board_editor_ids(&board.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((board, editors))
    })
    .await
    .map_err(join_error)??;

    if board.author_id != claims.sub.to_string() {
        warn!("User {} is forbidden to rotate token for board {}", claims.sub, id);
        return Err(StatusCode::FORBIDDEN);
    }

    let mut payload = mappers::board_payload(&board, &editors);
    payload.invite_edit_token = Uuid::new_v4();
    let token = payload.invite_edit_token;

    emit(
        &state,
        DbEvent::new(EventAction::Update, EntityPayload::Board(payload)),
    )
    .await?;

    info!("Generated new invite token for board {}", id);
    Ok(Json(BoardInviteToken { token }))
}

/// Join a board's editor set by presenting the current invite token.
pub async fn add_editor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BoardInviteToken>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let (board, editors, author) = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&board_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let editors = db
            .get_board_editor_ids(&board.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let author = db
            .get_user_by_id(&board.author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((board, editors, author))
    })
    .await
    .map_err(join_error)??;

    if board.invite_edit_token != req.token.to_string() {
        warn!("Invalid invite token used for board {}", id);
        return Err(StatusCode::FORBIDDEN);
    }

    let me = claims.sub.to_string();
    if board.author_id == me || editors.contains(&me) {
        info!("User {} is already an editor or the author of board {}", claims.sub, id);
        return Ok(StatusCode::OK);
    }

    let mut editors = editors;
    editors.push(me);

    emit(
        &state,
        DbEvent::new(
            EventAction::Update,
            EntityPayload::Board(mappers::board_payload(&board, &editors)),
        ),
    )
    .await?;

    let response = mappers::board_response(&board, author.as_ref());
    publish(&state, id, "Board", EventAction::Update, &response).await;

    info!("User {} added as editor to board {}", claims.sub, id);
    Ok(StatusCode::OK)
}

pub async fn list_editors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let board_id = id.to_string();
    let editors = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&board_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let ids = db
            .get_board_editor_ids(&board.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut users = Vec::with_capacity(ids.len());
        for user_id in &ids {
            if let Ok(Some(user)) = db.get_user_by_id(user_id) {
                users.push(user);
            }
        }
        Ok::<_, StatusCode>(users)
    })
    .await
    .map_err(join_error)??;

    let responses: Vec<_> = editors.iter().map(mappers::user_response).collect();
    Ok(Json(responses))
}

pub async fn remove_editor(
    State(state): State<AppState>,
    Path((board_id, editor_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let bid = board_id.to_string();
    let (board, editors, author) = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&bid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let editors = db
            .get_board_editor_ids(&board.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let author = db
            .get_user_by_id(&board.author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((board, editors, author))
    })
    .await
    .map_err(join_error)??;

    if board.author_id != claims.sub.to_string() {
        warn!("User {} is forbidden to remove editors from board {}", claims.sub, board_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let mut editors = editors;
    editors.retain(|e| e != &editor_id.to_string());

    emit(
        &state,
        DbEvent::new(
            EventAction::Update,
            EntityPayload::Board(mappers::board_payload(&board, &editors)),
        ),
    )
    .await?;

    let response = mappers::board_response(&board, author.as_ref());
    publish(&state, board_id, "Board", EventAction::Update, &response).await;

    info!("Editor {} removed from board {}", editor_id, board_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_component(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ComponentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.title.trim().is_empty() || req.title.len() > 255 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !(0.0..=1.0).contains(&req.x) || !(0.0..=1.0).contains(&req.y) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let bid = board_id.to_string();
    let me = claims.sub.to_string();
    let (board, is_editor, author) = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&bid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let is_editor = db
            .is_board_editor(&board.id, &me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let author = db
            .get_user_by_id(&me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((board, is_editor, author))
    })
    .await
    .map_err(join_error)??;

    if board.author_id != claims.sub.to_string() && !is_editor {
        warn!("User {} is forbidden to create component on board {}", claims.sub, board_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let component_id = Uuid::new_v4();
    emit(
        &state,
        DbEvent::new(
            EventAction::Create,
            EntityPayload::Component(ComponentPayload {
                id: component_id,
                title: req.title.clone(),
                description: req.description.clone(),
                kind: req.kind,
                x: req.x,
                y: req.y,
                board_id,
                author_id: claims.sub,
                is_anonymous_author: req.is_anonymous_author,
                is_anonymous_votes: req.is_anonymous_votes,
            }),
        ),
    )
    .await?;

    let response = retro_types::api::ComponentResponse {
        id: component_id,
        title: req.title,
        description: req.description,
        author: if req.is_anonymous_author {
            None
        } else {
            author.as_ref().map(mappers::user_response)
        },
        kind: req.kind,
        x: req.x,
        y: req.y,
        is_anonymous_author: req.is_anonymous_author,
        is_anonymous_votes: req.is_anonymous_votes,
        count_votes: 0,
    };

    publish(&state, board_id, "Component", EventAction::Create, &response).await;

    info!("Component created: {} on board {}", component_id, board_id);
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_components(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let bid = board_id.to_string();
    let components = tokio::task::spawn_blocking(move || {
        let board = db
            .get_board(&bid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let rows = db
            .get_components_by_board(&board.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let author = if row.is_anonymous_author {
                None
            } else {
                db.get_user_by_id(&row.author_id)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            };
            out.push((row, author));
        }
        Ok::<_, StatusCode>(out)
    })
    .await
    .map_err(join_error)??;

    let responses: Vec<_> = components
        .iter()
        .map(|(row, author)| mappers::component_response(row, author.as_ref()))
        .collect();

    Ok(Json(responses))
}
