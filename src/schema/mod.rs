//! GraphQL schema over the game services.

use async_graphql::{Context, ErrorExtensions, Schema};

use crate::{error::ServiceError, services::identity_service::Caller, state::SharedState};

mod mutation;
mod query;
mod subscription;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

/// Executable schema served on `/graphql` and `/subscriptions`.
pub type AppSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

/// Build the schema with `state` available to every resolver.
pub fn build_schema(state: SharedState) -> AppSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(state)
        .finish()
}

/// SDL of the schema, without any runtime data attached.
pub fn sdl() -> String {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .finish()
        .sdl()
}

pub(crate) fn shared_state<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a SharedState> {
    ctx.data::<SharedState>()
}

/// Caller attached to the request or connection, `None` when anonymous.
pub fn current_caller<'a>(ctx: &Context<'a>) -> Option<&'a Caller> {
    ctx.data_opt::<Caller>()
}

/// Convert into a GraphQL error carrying `extensions.code`.
pub(crate) fn graphql_error(err: impl Into<ServiceError>) -> async_graphql::Error {
    err.into().extend()
}
