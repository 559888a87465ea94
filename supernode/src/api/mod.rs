use std::sync::Arc;
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json,
    Router,
};
use serde_derive::Serialize;
use tracing::Instrument;
use crate::Supernode;

mod legacy;
mod peers;
pub mod result;
mod tasks;

#[derive(Clone)]
pub struct ApiState {

    pub node: Arc<Supernode>,

}

// Api routes, served both unversioned and below /api/v1.
pub fn router(node: Arc<Supernode>) -> Router {
    let state = ApiState { node };
    Router::new()
        .merge(routes())
        .nest("/api/v1", routes())
        .layer(middleware::from_fn(trace_mw))
        .with_state(state)
}

fn routes() -> Router<ApiState> {
    Router::new()
        .route("/_ping", get(ping))
        .route("/version", get(version))
        .route("/peer/registry", post(legacy::registry))
        .route("/peer/task", get(legacy::pull_piece_task))
        .route("/peer/piece/suc", get(legacy::report_piece))
        .route("/peer/service/down", get(legacy::report_service_down))
        .route("/peer/piece/error", post(legacy::report_piece_error))
        .route("/peers", post(peers::register_peer).get(peers::list_peers))
        .route("/peers/:id", get(peers::get_peer).delete(peers::deregister_peer))
        .route("/tasks", post(tasks::register_task).get(tasks::list_tasks))
        .route(
            "/tasks/:id",
            get(tasks::get_task).put(tasks::update_task).delete(tasks::delete_task),
        )
        .route("/tasks/:id/pieces/:range/error", post(tasks::report_piece_error))
}

async fn trace_mw(req: Request<Body>, next: Next) -> Response {
    let span = tracing::info_span!("api", method = %req.method(), path = %req.uri().path());
    async move {
        let resp = next.run(req).await;
        tracing::debug!("answered {}", resp.status());
        resp
    }
    .instrument(span)
    .await
}

async fn ping() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {

    version: &'static str,

    os: &'static str,

    arch: &'static str,

}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
    })
}
