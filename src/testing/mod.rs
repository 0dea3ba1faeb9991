//! Testing utilities for crumbgate
//!
//! Enabled for unit tests and, via the `testing` feature, for integration
//! tests. Provides fixed-key settings, a matching codec, and helpers for
//! minting (optionally back-dated) session cookies and Basic auth headers.

use actix_web::cookie::Cookie;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};

use crate::session::codec::{CookieCodec, SESSION_COOKIE_NAME};
use crate::settings::CrumbgateSettings;

/// Fixed session secret shared by [`test_settings`] and [`test_codec`]
pub const TEST_SESSION_SECRET: &str = "integration_test_session_secret!";

/// Settings matching the test codec, with plain-HTTP cookies for the actix
/// test harness
#[must_use]
pub fn test_settings() -> CrumbgateSettings {
    let mut settings = CrumbgateSettings::default();
    settings.session.session_secret = TEST_SESSION_SECRET.to_string();
    settings.cookies.secure = false;
    settings
}

/// A codec sealing under the same key and max age as [`test_settings`]
#[must_use]
pub fn test_codec() -> CookieCodec {
    let settings = test_settings();
    CookieCodec::new(
        settings.session.session_secret.as_bytes(),
        settings.session.max_age_seconds,
    )
}

/// Mint a session cookie whose stamp lies `age_seconds` in the past
///
/// # Panics
///
/// Panics if sealing fails, which only happens on a broken key setup.
#[must_use]
pub fn sealed_session_cookie(raw: &str, age_seconds: i64) -> Cookie<'static> {
    let stamp = Utc::now() - Duration::seconds(age_seconds);
    let sealed = test_codec()
        .seal_at(raw, stamp)
        .expect("sealing test cookie failed");
    Cookie::new(SESSION_COOKIE_NAME, sealed)
}

/// Build an `Authorization: Basic ...` header value
#[must_use]
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{username}:{password}"))
    )
}
