use axum::{routing::get, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/hello-world", get(hello_world))
}

pub async fn hello_world() -> &'static str {
    "Hello World"
}
