use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::users::Role;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: String, // numeric user ID, as a string on the wire
    pub role: Role,
    pub exp: i64, // expires at (unix timestamp)
}

impl TokenClaims {
    pub fn subject_id(&self) -> Result<i64, TokenError> {
        self.user_id.parse().map_err(|_| TokenError::Malformed)
    }
}
