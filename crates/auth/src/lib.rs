//! `stockbook-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Decision, authorize, evaluate, permissions_for_role};
pub use claims::{
    Hs256JwtValidator, JwtClaims, JwtValidator, TokenError, TokenValidationError, validate_claims,
};
pub use permissions::{Action, Permission, Resource};
pub use principal::Principal;
pub use roles::Role;
