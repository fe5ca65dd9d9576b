//! Credential verification, session tokens and session extractors.

pub mod middleware;
pub mod token;
pub mod verify;

pub use middleware::{
    LiveSession, LoginState, ResolvedSession, SessionCookie, SessionRejection, SESSION_COOKIE,
};
pub use token::generate_session_token;
pub use verify::{hash_password, verify_password};
