use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use retro_types::api::{Claims, ComponentEditRequest, VoteResponse};
use retro_types::events::{DbEvent, EntityPayload, EventAction, VotePayload};

use crate::emit::{emit, join_error, publish};
use crate::mappers;
use crate::state::AppState;

/// Component row plus everything authorization and the response need.
struct ComponentContext {
    component: retro_db::models::ComponentRow,
    board_author_id: String,
    is_editor: bool,
    author: Option<retro_db::models::UserRow>,
}

fn load_component_context(
    db: &retro_db::Database,
    component_id: &str,
    user_id: &str,
) -> Result<Option<ComponentContext>, StatusCode> {
    let Some(component) = db
        .get_component(component_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    else {
        return Ok(None);
    };

    let board = db
        .get_board(&component.board_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let is_editor = db
        .is_board_editor(&board.id, user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let author = if component.is_anonymous_author {
        None
    } else {
        db.get_user_by_id(&component.author_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    };

    Ok(Some(ComponentContext {
        component,
        board_author_id: board.author_id,
        is_editor,
        author,
    }))
}

pub async fn edit_component(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ComponentEditRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if let Some(x) = req.x {
        if !(0.0..=1.0).contains(&x) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    if let Some(y) = req.y {
        if !(0.0..=1.0).contains(&y) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let db = state.db.clone();
    let cid = id.to_string();
    let me = claims.sub.to_string();
    let ctx = tokio::task::spawn_blocking(move || load_component_context(&db, &cid, &me))
        .await
        .map_err(join_error)??
        .ok_or(StatusCode::NOT_FOUND)?;

    if ctx.board_author_id != claims.sub.to_string() && !ctx.is_editor {
        warn!("User {} is forbidden to edit component {}", claims.sub, id);
        return Err(StatusCode::FORBIDDEN);
    }

    // Absent fields keep their stored value.
    let mut updated = ctx.component;
    if let Some(title) = req.title {
        if title.trim().is_empty() || title.len() > 255 {
            return Err(StatusCode::BAD_REQUEST);
        }
        updated.title = title;
    }
    if let Some(description) = req.description {
        updated.description = Some(description);
    }
    if let Some(x) = req.x {
        updated.x = x;
    }
    if let Some(y) = req.y {
        updated.y = y;
    }

    emit(
        &state,
        DbEvent::new(
            EventAction::Update,
            EntityPayload::Component(mappers::component_payload(&updated)),
        ),
    )
    .await?;

    let board_id = mappers::parse_uuid(&updated.board_id, "component row");
    let response = mappers::component_response(&updated, ctx.author.as_ref());
    publish(&state, board_id, "Component", EventAction::Update, &response).await;

    info!("Component {} edited by {}", id, claims.sub);
    Ok(Json(response))
}

pub async fn delete_component(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let cid = id.to_string();
    let me = claims.sub.to_string();
    let ctx = tokio::task::spawn_blocking(move || load_component_context(&db, &cid, &me))
        .await
        .map_err(join_error)??;

    // Already gone: nothing to emit.
    let Some(ctx) = ctx else {
        info!("Component {} not found, delete aborted", id);
        return Ok(StatusCode::NO_CONTENT);
    };

    if ctx.board_author_id != claims.sub.to_string() && !ctx.is_editor {
        warn!("User {} is forbidden to delete component {}", claims.sub, id);
        return Err(StatusCode::FORBIDDEN);
    }

    emit(
        &state,
        DbEvent::new(
            EventAction::Delete,
            EntityPayload::Component(mappers::component_payload(&ctx.component)),
        ),
    )
    .await?;

    let board_id = mappers::parse_uuid(&ctx.component.board_id, "component row");
    let response = mappers::component_response(&ctx.component, ctx.author.as_ref());
    publish(&state, board_id, "Component", EventAction::Delete, &response).await;

    info!("Component {} deleted by {}", id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

/// Any authenticated user may vote; one vote per user per component.
pub async fn add_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let cid = id.to_string();
    let me = claims.sub.to_string();
    let (component, already_voted) = tokio::task::spawn_blocking(move || {
        let component = db
            .get_component(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let already_voted = db
            .has_vote(&component.id, &me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>((component, already_voted))
    })
    .await
    .map_err(join_error)??;

    if already_voted {
        info!("User {} has already voted for component {}, skipping", claims.sub, id);
        return Ok(StatusCode::OK);
    }

    emit(
        &state,
        DbEvent::new(
            EventAction::Create,
            EntityPayload::Vote(VotePayload {
                user_id: claims.sub,
                component_id: id,
            }),
        ),
    )
    .await?;

    let board_id = mappers::parse_uuid(&component.board_id, "component row");
    publish(
        &state,
        board_id,
        "Vote",
        EventAction::Create,
        &VoteResponse { component_id: id },
    )
    .await;

    info!("Vote added by {} to component {}", claims.sub, id);
    Ok(StatusCode::OK)
}

pub async fn remove_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let cid = id.to_string();
    let me = claims.sub.to_string();
    let found = tokio::task::spawn_blocking(move || {
        let Some(component) = db
            .get_component(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        else {
            return Ok(None);
        };
        let has_vote = db
            .has_vote(&component.id, &me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        Ok::<_, StatusCode>(Some((component, has_vote)))
    })
    .await
    .map_err(join_error)??;

    let Some((component, has_vote)) = found else {
        info!("Component {} not found, remove vote aborted", id);
        return Ok(StatusCode::NO_CONTENT);
    };

    // No vote to remove: nothing to emit.
    if !has_vote {
        return Ok(StatusCode::NO_CONTENT);
    }

    emit(
        &state,
        DbEvent::new(
            EventAction::Delete,
            EntityPayload::Vote(VotePayload {
                user_id: claims.sub,
                component_id: id,
            }),
        ),
    )
    .await?;

    let board_id = mappers::parse_uuid(&component.board_id, "component row");
    publish(
        &state,
        board_id,
        "Vote",
        EventAction::Delete,
        &VoteResponse { component_id: id },
    )
    .await;

    info!("Vote removed by {} from component {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}
