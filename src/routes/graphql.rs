use async_graphql::{
    Data, ErrorExtensions,
    http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource},
};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    Extension, Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect},
    routing::get,
};
use tracing::{debug, info};

use crate::{
    error::AppError,
    schema::AppSchema,
    services::identity_service,
    state::SharedState,
};

/// Execute a query or mutation on behalf of the caller named in `Authorization`.
pub async fn graphql_handler(
    State(state): State<SharedState>,
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> Result<GraphQLResponse, AppError> {
    let caller = identity_service::caller_from_headers(&state, &headers).await?;
    let mut request = request.into_inner();
    if let Some(caller) = caller {
        request = request.data(caller);
    }
    Ok(schema.execute(request).await.into())
}

/// Serve GraphiQL wired to both endpoints.
pub async fn graphiql() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/subscriptions")
            .finish(),
    )
}

/// Upgrade into a GraphQL WebSocket session; the caller is read from `connection_init`.
pub async fn subscriptions_handler(
    State(state): State<SharedState>,
    Extension(schema): Extension<AppSchema>,
    protocol: GraphQLProtocol,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, schema, protocol)
                .on_connection_init(move |payload| connection_data(state, payload))
                .serve()
        })
}

async fn connection_data(
    state: SharedState,
    payload: serde_json::Value,
) -> async_graphql::Result<Data> {
    let mut data = Data::default();
    match identity_service::caller_from_init_payload(&state, &payload).await {
        Ok(Some(caller)) => {
            info!(user_id = %caller.user_id, "subscription connection opened");
            data.insert(caller);
        }
        Ok(None) => debug!("anonymous subscription connection opened"),
        Err(err) => {
            info!(error = %err, "subscription connection refused");
            return Err(err.extend());
        }
    }
    Ok(data)
}

/// Redirect to the hosted Apollo sandbox pointed at this server.
pub async fn explorer(State(state): State<SharedState>) -> Redirect {
    Redirect::temporary(&state.config().explorer_url())
}

/// Configure the GraphQL endpoints. Expects an [`AppSchema`] extension layer.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .route("/subscriptions", get(subscriptions_handler))
        .route("/explorer", get(explorer))
}
