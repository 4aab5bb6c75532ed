use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::store::TodoStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn TodoStore>,
    /// Fired on shutdown. Sagas stop at their next step and roll back.
    pub shutdown: CancellationToken,
}
