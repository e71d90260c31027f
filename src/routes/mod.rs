use axum::{Extension, Router};

use crate::{schema::build_schema, state::SharedState};

pub mod graphql;
pub mod health;
pub mod sse;

/// Compose all route trees, wiring in shared state and the GraphQL schema.
pub fn router(state: SharedState) -> Router<()> {
    let schema = build_schema(state.clone());

    health::router()
        .merge(sse::router())
        .merge(graphql::router())
        .layer(Extension(schema))
        .with_state(state)
}
