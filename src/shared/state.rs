use crate::config::AppConfig;
use crate::shared::utils::DbPool;

/// Shared application state handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
}
