use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::host::registry::CommandRegistry;

pub mod command;

pub fn api_routes(registry: Arc<CommandRegistry>) -> Router {
    Router::new()
        .route("/command", post(command::command_handler))
        .route("/commands", get(command::commands_handler))
        .with_state(registry)
}
