use async_graphql::{Context, Object, Result};

use crate::{
    dto::game::{GameView, UserView},
    schema::{current_caller, graphql_error, shared_state},
    services::{game_service, identity_service::require_caller},
    state::game::{GameId, UserId},
};

#[derive(Debug, Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Look up a game by id.
    async fn game(&self, ctx: &Context<'_>, id: String) -> Result<GameView> {
        let state = shared_state(ctx)?;
        let id = GameId::parse(&id).map_err(graphql_error)?;
        let game = game_service::get_game(state, &id)
            .await
            .map_err(graphql_error)?;
        Ok(game.into())
    }

    /// A user by id, or the caller when `id` is omitted.
    async fn user(&self, ctx: &Context<'_>, id: Option<String>) -> Result<UserView> {
        let user_id = match id {
            Some(raw) => UserId::parse(&raw).map_err(graphql_error)?,
            None => require_caller(current_caller(ctx))
                .map_err(graphql_error)?
                .user_id
                .clone(),
        };
        Ok(UserView::new(user_id))
    }
}
