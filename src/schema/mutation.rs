use async_graphql::{Context, Object, Result};

use crate::{
    dto::game::{GameMutationResponse, GameStatusDto, GameTypeDto, TimeLimitDto},
    schema::{current_caller, graphql_error, shared_state},
    services::{game_service, identity_service::require_caller},
    state::game::GameId,
};

#[derive(Debug, Default)]
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Open a new game with the caller in a random seat.
    async fn game_create(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "type")] game_type: GameTypeDto,
        limit: TimeLimitDto,
    ) -> Result<GameMutationResponse> {
        let state = shared_state(ctx)?;
        let caller = require_caller(current_caller(ctx)).map_err(graphql_error)?;
        let game = game_service::create_game(state, caller, game_type.into(), limit.into())
            .await
            .map_err(graphql_error)?;
        Ok(GameMutationResponse::ok("game was successfully created", game))
    }

    async fn game_join(&self, ctx: &Context<'_>, id: String) -> Result<GameMutationResponse> {
        let state = shared_state(ctx)?;
        let caller = require_caller(current_caller(ctx)).map_err(graphql_error)?;
        let id = GameId::parse(&id).map_err(graphql_error)?;
        let game = game_service::join_game(state, caller, &id)
            .await
            .map_err(graphql_error)?;
        Ok(GameMutationResponse::ok("game successfully joined", game))
    }

    /// Play a move and/or report how the game ended.
    async fn game_move(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(name = "move")] notation: Option<String>,
        status: Option<GameStatusDto>,
    ) -> Result<GameMutationResponse> {
        let state = shared_state(ctx)?;
        let caller = require_caller(current_caller(ctx)).map_err(graphql_error)?;
        let id = GameId::parse(&id).map_err(graphql_error)?;
        let outcome = status.unwrap_or_default().into();
        let game = game_service::submit_move(state, caller, &id, notation.as_deref(), outcome)
            .await
            .map_err(graphql_error)?;
        Ok(GameMutationResponse::ok("move was successfully added", game))
    }

    async fn game_abort(&self, ctx: &Context<'_>, id: String) -> Result<GameMutationResponse> {
        let state = shared_state(ctx)?;
        let caller = require_caller(current_caller(ctx)).map_err(graphql_error)?;
        let id = GameId::parse(&id).map_err(graphql_error)?;
        let game = game_service::abort_game(state, caller, &id)
            .await
            .map_err(graphql_error)?;
        Ok(GameMutationResponse::ok("game aborted", game))
    }
}
