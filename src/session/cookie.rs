//! Session cookie construction
//!
//! Centralizes the fixed cookie attribute policy: `HttpOnly` always,
//! `SameSite=Strict` always, `Secure` per configuration, path and domain
//! scoped at construction. The value placed here is already sealed by the
//! codec; this module never sees plaintext.

use actix_web::cookie::{time, Cookie, SameSite};

use crate::session::codec::SESSION_COOKIE_NAME;

/// Builds session cookies with the configured scope and attributes
#[derive(Clone)]
pub struct CookieFactory {
    path: String,
    domain: String,
    secure: bool,
    max_age_seconds: u64,
}

impl CookieFactory {
    /// Create a factory with the fixed per-deployment cookie policy
    #[must_use]
    pub fn new(path: String, domain: String, secure: bool, max_age_seconds: u64) -> Self {
        Self {
            path,
            domain,
            secure,
            max_age_seconds,
        }
    }

    /// Build the session cookie around an already-sealed value
    #[must_use]
    pub fn build(&self, sealed_value: String) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE_NAME, sealed_value)
            .path(self.path.clone())
            .domain(self.domain.clone())
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::seconds(
                // Saturate rather than rewrite an out-of-range configuration
                i64::try_from(self.max_age_seconds).unwrap_or(i64::MAX),
            ))
            .finish()
    }
}
