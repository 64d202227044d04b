pub mod auth;
pub mod guards;

pub use auth::{IdentityBinder, JwtVerifier, TokenVerifier};
pub use guards::AuthenticatedUser;
