use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use super::{auth, jobs, middleware as mw, system, tickets, workflow, ws};
use crate::metrics::encode_metrics;
use crate::state::AppState;

const API_PREFIX: &str = "/api/e-memo-job-reservation";

pub fn create_router(state: Arc<AppState>) -> Router {
    // Everything behind a bearer token. Mutations additionally pass the
    // edit-mode gate, which lets reads and master users through.
    let authed = Router::new()
        .route("/logout", post(auth::logout))
        .route("/auth/ws-ticket", post(auth::ws_ticket))
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/reorder", put(tickets::reorder_tickets))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}", put(tickets::update_ticket))
        .route("/tickets/{id}/action", post(tickets::execute_action))
        .route("/tickets/{id}/available-actions", get(tickets::available_actions))
        .route("/tickets/{id}/files", post(tickets::add_files))
        .route("/tickets/{id}/files", delete(tickets::remove_files_handler))
        .route("/tickets/{id}/rejections", get(tickets::list_rejections))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/reorder", put(jobs::reorder_jobs))
        .route("/jobs/{id}/assign", put(jobs::assign_pic))
        .route("/rejected-tickets", post(tickets::create_rejection))
        .route(
            "/rejected-tickets/{id}/feedback",
            put(tickets::update_rejection_feedback),
        )
        .route(
            "/rejected-tickets/{id}/seen",
            put(tickets::update_rejection_seen),
        )
        .route("/rejected-tickets/{id}", delete(tickets::delete_rejection))
        .route("/sections", get(workflow::list_sections))
        .route("/sections/reorder", put(workflow::reorder_sections))
        .route("/sections/{id}/active", put(workflow::set_section_active))
        .route("/sections/{id}", delete(workflow::delete_section))
        .route("/statuses", get(workflow::list_statuses))
        .route("/statuses/reorder", put(workflow::reorder_status_bands))
        .route("/system/edit-mode", get(system::get_edit_mode))
        .route("/system/edit-mode", post(system::set_edit_mode))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::edit_mode_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::auth_middleware,
        ));

    let public = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/auth/ws-public-ticket", post(auth::ws_public_ticket))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(|| async { encode_metrics() }))
        .nest(API_PREFIX, public.merge(authed))
        .layer(middleware::from_fn(mw::metrics_middleware))
        .with_state(state)
}
