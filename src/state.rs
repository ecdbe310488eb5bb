//! Shared handler state: the database pool and the salts needed by C1.
//! Grounded on `indexer/src/rpc.rs::ApiState`.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
}
