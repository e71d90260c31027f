use async_graphql::{Context, Result, Subscription};
use futures::{Stream, StreamExt};

use crate::{
    dto::game::MoveView,
    schema::{current_caller, graphql_error, shared_state},
    services::subscription_service,
    state::game::GameId,
};

#[derive(Debug, Default)]
pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Moves committed by the other players of game `id`.
    ///
    /// Opening a second subscription on the same game completes the first
    /// subscription's stream; the newer one receives from then on.
    async fn on_move_new(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> Result<impl Stream<Item = MoveView>> {
        let state = shared_state(ctx)?;
        let id = GameId::parse(&id).map_err(graphql_error)?;
        let moves = subscription_service::subscribe(state, current_caller(ctx), &id)
            .await
            .map_err(graphql_error)?;
        Ok(moves.map(MoveView::from))
    }
}
