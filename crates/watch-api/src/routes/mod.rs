pub mod targets;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    targets::router()
}
