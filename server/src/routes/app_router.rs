use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ServerState;

use super::{
    handler_404,
    handlers::{auth, classify, graph, inbox, scheduler, status},
};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(status::handler_root))
            .route("/health", get(status::handler_health))
            .route("/auth/login", get(auth::handler_auth_login))
            .route("/auth/callback", get(auth::handler_auth_callback))
            .route("/graph/fetch", get(graph::handler_graph_fetch))
            .route("/classify", post(classify::handler_classify))
            .route("/classify/categories", get(classify::handler_categories))
            .route("/inbox/process-new", post(inbox::handler_process_new))
            .nest(
                "/scheduler",
                Router::new()
                    .route("/start", post(scheduler::handler_start))
                    .route("/stop", post(scheduler::handler_stop))
                    .route("/status", get(scheduler::handler_status)),
            )
            .route("/debug/processed", get(status::handler_debug_processed))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            .fallback(handler_404)
    }
}
