use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::handlers;
use crate::tables::Database;

pub struct AppState {
    pub database: Database,
}

impl AppState {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tables", get(handlers::list_tables))
        .route("/api/v1/tables/{name}", get(handlers::get_table))
        .route(
            "/api/v1/tables/{name}/rows",
            axum::routing::post(handlers::insert_row)
                .put(handlers::update_row)
                .delete(handlers::delete_row),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
