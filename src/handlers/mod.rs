//! Demo request handlers
//!
//! Thin glue around the session core: a hello endpoint gated by the session
//! (with an HTTP Basic credential check standing in for a real verifier) and
//! a health probe. Authorization decisions live here, not in the middleware.

use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use crate::session::Session;
use crate::settings::CrumbgateSettings;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Demo endpoint: requires a valid session, bootstrapping one from HTTP
/// Basic credentials when no cookie-backed session exists
///
/// On a successful credential check the identity is established through the
/// session's single mutation entry point, which queues the cookie write the
/// middleware applies on the way out.
pub async fn hello(
    req: HttpRequest,
    session: Session,
    settings: web::Data<CrumbgateSettings>,
) -> HttpResponse {
    if !session.is_valid() {
        let Some((username, password)) = basic_credentials(&req) else {
            return challenge();
        };

        match settings.demo.verify(&username, &password) {
            Some(user_id) => session.set_identity(user_id),
            None => {
                log::warn!("rejected basic auth credentials for user {username:?}");
                return challenge();
            }
        }
    }

    HttpResponse::Ok().body("hello with secure cookie!")
}

/// Health check endpoint
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// 401 with a Basic challenge, and no cookie
fn challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header(("WWW-Authenticate", "Basic"))
        .finish()
}

/// Parse `Authorization: Basic base64(user:password)` from the request
fn basic_credentials(req: &HttpRequest) -> Option<(String, String)> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
