use axum::{
    Router,
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::{Stream, StreamExt};
use tracing::info;

use crate::{
    dto::game::MoveView,
    error::{AppError, ServiceError},
    services::{identity_service, subscription_service},
    state::{SharedState, game::GameId},
};

/// Stream the moves other players commit on a game, mirroring `onMoveNew`.
pub async fn game_moves(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let id = GameId::parse(&id).map_err(ServiceError::from)?;
    let caller = identity_service::caller_from_headers(&state, &headers).await?;
    let moves = subscription_service::subscribe(&state, caller.as_ref(), &id).await?;
    info!(game_id = %id, "new move SSE connection");

    let events = moves.map(|played| {
        let ply = played.ply;
        Event::default()
            .event("move")
            .id(ply.to_string())
            .json_data(MoveView::from(played))
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.config().sse_keep_alive())
            .text("keep-alive"),
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/games/{id}/moves", get(game_moves))
}
