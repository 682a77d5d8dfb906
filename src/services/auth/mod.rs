pub mod access_jwt;
pub mod factory;
pub mod jwks;
pub mod scope;
pub mod token;

pub use access_jwt::{AuthError, Authenticator};
pub use factory::build_authenticator;
pub use jwks::{HttpKeySetSource, KeyResolver, KeyResolverError, KeySetSource};
pub use scope::{ScopeError, check_scope};
pub use token::VerifiedToken;
