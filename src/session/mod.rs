//! Stateless cookie-session handling
//!
//! - [`codec`] - sealing and opening the stamped cookie payload
//! - [`cookie`] - cookie attribute policy
//! - [`session`] - the per-request session value object
//! - [`middleware`] - the actix-web middleware tying them together

pub mod codec;
pub mod cookie;
pub mod middleware;
pub mod session;

pub use codec::{CodecError, CookieCodec, SESSION_COOKIE_NAME};
pub use cookie::CookieFactory;
pub use middleware::{SessionConfig, SessionMiddleware};
pub use session::Session;
