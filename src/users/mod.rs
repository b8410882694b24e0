mod dto;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod pagination;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use pagination::{Page, PageRequest};
pub use repo::{PgUserStore, UserStore};
pub use repo_types::{Credentials, NewUser, Role, User, UserPatch};
pub use services::AccountService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::user_routes())
}
