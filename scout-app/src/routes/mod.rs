pub mod chat;
pub mod health;
pub mod threads;

use axum::Router;

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(threads::router())
}
