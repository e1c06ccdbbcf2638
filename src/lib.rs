pub mod auth;
pub mod config;
pub mod files;
pub mod reports;
pub mod shared;
pub mod tickets;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

/// All API routes from all modules, merged into one router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::users::configure_users_routes())
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::files::configure_files_routes())
        .merge(crate::reports::configure_reports_routes())
}
