use std::sync::Arc;

use axum::{
    body::Body,
    http::Request,
    routing::get,
    Router,
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::error::Error;
use crate::{chapel_view, feedback_view, speaker_view, task_view, user_view, AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Copy, Default)]
struct RequestUuid;

impl MakeRequestId for RequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}

fn users() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(user_view::list_users)
                .post(user_view::create_user)
                .put(user_view::upsert_user),
        )
        .route(
            "/:id",
            get(user_view::get_user)
                .patch(user_view::update_user)
                .put(user_view::update_user)
                .delete(user_view::delete_user),
        )
}

fn speakers() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(speaker_view::list_speakers).post(speaker_view::create_speaker),
        )
        .route(
            "/:id",
            get(speaker_view::get_speaker)
                .patch(speaker_view::update_speaker)
                .put(speaker_view::update_speaker)
                .delete(speaker_view::delete_speaker),
        )
}

fn chapel_sessions() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(chapel_view::list_sessions).post(chapel_view::create_session),
        )
        .route(
            "/:id",
            get(chapel_view::get_session)
                .patch(chapel_view::update_session)
                .delete(chapel_view::delete_session),
        )
}

fn feedback() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(feedback_view::list_feedback).post(feedback_view::create_feedback),
        )
        .route(
            "/:id",
            get(feedback_view::get_feedback)
                .patch(feedback_view::update_feedback)
                .delete(feedback_view::delete_feedback),
        )
}

fn tasks() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(task_view::list_tasks).post(task_view::create_task))
        .route(
            "/:id",
            get(task_view::get_task)
                .patch(task_view::update_task)
                .delete(task_view::delete_task),
        )
}

async fn health() -> &'static str {
    "ok"
}

async fn no_route() -> Error {
    Error::NotFound("no such route".to_owned())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/users", users())
        .nest("/api/speakers", speakers())
        .nest("/api/chapel-sessions", chapel_sessions())
        .nest("/api/chapelsessions", chapel_sessions())
        .route(
            "/api/chapel/:chapel_id/feedback",
            get(feedback_view::list_session_feedback),
        )
        .route(
            "/api/chapel/:chapel_id/feedback/:feedback_id",
            get(feedback_view::get_session_feedback),
        )
        .nest("/api/feedback", feedback())
        .nest("/api/feedbacks", feedback())
        .nest("/api/tasks", tasks())
        .fallback(no_route)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(RequestUuid))
        .with_state(state)
}
