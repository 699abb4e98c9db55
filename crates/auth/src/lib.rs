//! `routekit-auth`: authentication boundary.
//!
//! Configuration, session tokens and the identity-provider contract. This
//! crate is decoupled from HTTP; the API crate mounts it.

pub mod claims;
pub mod config;
pub mod jwt;
pub mod memory;
pub mod provider;
pub mod roles;
pub mod session;

pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use config::{
    AuthConfig, DatabaseConfig, DatabaseProvider, EmailPasswordConfig, SessionConfig, SocialProvider,
    SocialProviderConfig,
};
pub use jwt::JwtSessionVerifier;
pub use memory::MemoryIdentityProvider;
pub use provider::{AuthError, IdentityProvider, SessionResolver, SignInEmail, SignUpEmail, SignedIn};
pub use roles::Role;
pub use session::{Session, SessionUser};
