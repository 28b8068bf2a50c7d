//! Authentication for rekrut
//!
//! The login decision logic (directory vs. local path), the session token
//! contract, and password hashing.

pub mod authenticator;
pub mod password;
pub mod session;

pub use authenticator::{Authenticator, LoginAttempt, LoginMethod};
pub use session::{SessionClaims, SessionIssuer};
