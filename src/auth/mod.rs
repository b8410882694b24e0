mod claims;
pub mod extractors;
pub mod jwt;
pub mod password;

pub use claims::TokenClaims;
pub use extractors::AuthUser;
pub use jwt::TokenIssuer;
pub use password::PasswordHasher;
