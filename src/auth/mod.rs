//! Authentication system
//!
//! Handles the identity registry, credential validation, identity tokens and
//! the rate-limited login flow.

pub mod credentials;
pub mod login;
pub mod token;
pub mod validator;

pub use credentials::{Identity, IdentityRegistry};
pub use login::LoginService;
pub use token::TokenService;
pub use validator::{hash_password, verify_password};
