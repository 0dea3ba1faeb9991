//! Session middleware: establishes, validates, refreshes, and propagates the
//! per-request [`Session`]
//!
//! On the inbound path the middleware opens the session cookie through the
//! codec and seeds a `Session` into the request extensions. On the outbound
//! path it drains the session's pending cookie write (queued either by the
//! age-based refresh decision or by a handler calling `set_identity`) and
//! attaches at most one `Set-Cookie` to the response. Cookie problems never
//! abort the request chain; the handler layer decides what an invalid
//! session means.

use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpResponse};
use chrono::{DateTime, Duration, Utc};

use crate::session::codec::{saturating_seconds, CodecError, CookieCodec, SESSION_COOKIE_NAME};
use crate::session::cookie::CookieFactory;
use crate::session::session::Session;
use crate::settings::CrumbgateSettings;

/// Session middleware policy, fixed at construction
///
/// No runtime reconfiguration: the key and the durations are read-only for
/// the lifetime of the server.
#[derive(Clone)]
pub struct SessionConfig {
    /// Cookie received only when the URL starts with this path
    pub cookie_path: String,
    /// Cookie received only when the URL domain matches this one
    pub cookie_domain: String,
    /// Mark the cookie secure-transport-only
    pub secure: bool,
    /// Absolute cookie lifetime in seconds
    pub max_age_seconds: u64,
    /// Age in seconds beyond which an otherwise-valid cookie is reissued
    pub refresh_threshold_seconds: u64,
    /// Signing/encryption key material
    pub secret: Vec<u8>,
}

impl SessionConfig {
    /// Build the middleware configuration from the loaded settings
    #[must_use]
    pub fn from_settings(settings: &CrumbgateSettings) -> Self {
        Self {
            cookie_path: settings.session.cookie_path.clone(),
            cookie_domain: settings.session.cookie_domain.clone(),
            secure: settings.cookies.secure,
            max_age_seconds: settings.session.max_age_seconds,
            refresh_threshold_seconds: settings.session.refresh_threshold_seconds,
            secret: settings.session.session_secret.as_bytes().to_vec(),
        }
    }
}

/// Middleware factory wrapping a downstream service with session handling
pub struct SessionMiddleware {
    codec: Rc<CookieCodec>,
    factory: Rc<CookieFactory>,
    refresh_threshold: Duration,
}

impl SessionMiddleware {
    /// Create the middleware from its configuration
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            codec: Rc::new(CookieCodec::new(&config.secret, config.max_age_seconds)),
            factory: Rc::new(CookieFactory::new(
                config.cookie_path.clone(),
                config.cookie_domain.clone(),
                config.secure,
                config.max_age_seconds,
            )),
            refresh_threshold: saturating_seconds(config.refresh_threshold_seconds),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionService {
            service: Rc::new(service),
            codec: Rc::clone(&self.codec),
            factory: Rc::clone(&self.factory),
            refresh_threshold: self.refresh_threshold,
        }))
    }
}

/// Per-worker session service produced by [`SessionMiddleware`]
pub struct SessionService<S> {
    service: Rc<S>,
    codec: Rc<CookieCodec>,
    factory: Rc<CookieFactory>,
    refresh_threshold: Duration,
}

impl<S, B> Service<ServiceRequest> for SessionService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let codec = Rc::clone(&self.codec);
        let factory = Rc::clone(&self.factory);
        let refresh_threshold = self.refresh_threshold;

        Box::pin(async move {
            let (session, stamp) = open_session(&codec, &req);
            req.extensions_mut().insert(session.clone());

            // Re-assert the session's own identity when the cookie is past
            // the refresh threshold, queuing a fresh-stamped re-issue. Within
            // the threshold the cookie is left untouched so we are not
            // re-sealing on every request.
            if session.is_valid() {
                let age = Utc::now() - stamp;
                if age > refresh_threshold {
                    if let Some(user_id) = session.user_id() {
                        log::info!(
                            "session cookie for user {user_id} is {}s old, refreshing",
                            age.num_seconds()
                        );
                        session.set_identity(user_id);
                    }
                }
            }

            let mut res = service.call(req).await?;

            if let Some(user_id) = session.take_pending_issue() {
                issue_cookie(&codec, &factory, res.response_mut(), user_id);
            }

            Ok(res)
        })
    }
}

/// Seed the request's session from its cookie, if any
///
/// All decode failures collapse to an anonymous session; they differ only in
/// log level. The synthetic `now()` stamp on the anonymous path means a
/// session established mid-request is treated as freshly issued and never
/// triggers a refresh in the same request.
fn open_session(codec: &CookieCodec, req: &ServiceRequest) -> (Session, DateTime<Utc>) {
    match read_request_cookie(codec, req) {
        Ok((user_id, stamp)) => {
            log::debug!("found a valid session cookie for user {user_id}");
            (Session::authenticated(user_id), stamp)
        }
        Err(err) => {
            match &err {
                CodecError::Missing => log::debug!("{err}"),
                CodecError::Invalid(_) | CodecError::Expired { .. } => {
                    log::info!("discarding session cookie: {err}");
                }
                // Authenticated but unparseable payload: same anonymous
                // fallback, logged loud because it means a protocol mismatch
                // or a key shared with another writer.
                CodecError::MalformedPayload(_) => {
                    log::error!("discarding session cookie: {err}");
                }
            }
            (Session::anonymous(), Utc::now())
        }
    }
}

fn read_request_cookie(
    codec: &CookieCodec,
    req: &ServiceRequest,
) -> Result<(i64, DateTime<Utc>), CodecError> {
    let cookie = req
        .request()
        .cookie(SESSION_COOKIE_NAME)
        .ok_or(CodecError::Missing)?;
    codec.open_user_id(cookie.value())
}

/// Seal and attach the outbound session cookie
///
/// Failures are logged and non-fatal: the response proceeds without a
/// cookie and the in-memory session state is unaffected for this request.
fn issue_cookie<B>(
    codec: &CookieCodec,
    factory: &CookieFactory,
    res: &mut HttpResponse<B>,
    user_id: i64,
) {
    match codec.seal(&user_id.to_string()) {
        Ok(sealed) => {
            let cookie = factory.build(sealed);
            if let Err(err) = res.add_cookie(&cookie) {
                log::error!("can not set session cookie on response: {err}");
            } else {
                log::info!("set session cookie for user id {user_id}");
            }
        }
        Err(err) => {
            log::error!("failed to seal session cookie for user id {user_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::http::header;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{web, App};

    const TEST_SECRET: &[u8] = b"middleware_test_secret_key_32ch!";

    fn test_config() -> SessionConfig {
        SessionConfig {
            cookie_path: "/".to_string(),
            cookie_domain: "localhost".to_string(),
            secure: false,
            max_age_seconds: 3600,
            refresh_threshold_seconds: 600,
            secret: TEST_SECRET.to_vec(),
        }
    }

    fn test_codec() -> CookieCodec {
        CookieCodec::new(TEST_SECRET, 3600)
    }

    async fn whoami(session: Session) -> HttpResponse {
        match session.user_id() {
            Some(id) => HttpResponse::Ok().body(id.to_string()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    async fn login(session: Session) -> HttpResponse {
        session.set_identity(42);
        HttpResponse::Ok().body("logged in")
    }

    fn set_cookie_headers(res: &actix_web::dev::ServiceResponse) -> Vec<String> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[actix_web::test]
    async fn test_absent_cookie_yields_anonymous_session() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let res = call_service(&app, TestRequest::get().uri("/").to_request()).await;

        assert!(res.status().is_success());
        assert!(set_cookie_headers(&res).is_empty());
        let body = actix_web::test::read_body(res).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn test_fresh_cookie_is_not_reissued() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let sealed = test_codec().seal("42").unwrap();
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        assert!(res.status().is_success());
        // Within the refresh threshold: no outbound Set-Cookie
        assert!(set_cookie_headers(&res).is_empty());
        let body = actix_web::test::read_body(res).await;
        assert_eq!(body, "42");
    }

    #[actix_web::test]
    async fn test_stale_cookie_triggers_refresh() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        // Stamp is past the 600s threshold but within the 3600s max age
        let codec = test_codec();
        let stale_stamp = Utc::now() - Duration::seconds(1200);
        let sealed = codec.seal_at("42", stale_stamp).unwrap();
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        let cookies = set_cookie_headers(&res);
        assert_eq!(cookies.len(), 1);

        // The reissued cookie carries the same id and a fresh stamp
        let reissued = Cookie::parse(cookies[0].clone()).unwrap();
        assert_eq!(reissued.name(), SESSION_COOKIE_NAME);
        let (user_id, stamp) = codec.open_user_id(reissued.value()).unwrap();
        assert_eq!(user_id, 42);
        assert!(stamp > stale_stamp);
        assert!((Utc::now() - stamp).num_seconds() < 5);
    }

    #[actix_web::test]
    async fn test_oversized_refresh_threshold_disables_refresh() {
        // An out-of-range threshold saturates instead of collapsing to a
        // short default that would reissue on every aging cookie
        let config = SessionConfig {
            refresh_threshold_seconds: u64::MAX,
            ..test_config()
        };
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&config))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let sealed = test_codec()
            .seal_at("42", Utc::now() - Duration::seconds(1200))
            .unwrap();
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        assert!(res.status().is_success());
        assert!(set_cookie_headers(&res).is_empty());
    }

    #[actix_web::test]
    async fn test_cookie_past_max_age_is_discarded() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let sealed = test_codec()
            .seal_at("42", Utc::now() - Duration::seconds(7200))
            .unwrap();
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        assert!(res.status().is_success());
        assert!(set_cookie_headers(&res).is_empty());
        let body = actix_web::test::read_body(res).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn test_malformed_payload_falls_back_to_anonymous() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        // Seals fine, but the payload is not an id
        let sealed = test_codec().seal("gibberish").unwrap();
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        assert!(res.status().is_success());
        assert!(set_cookie_headers(&res).is_empty());
        let body = actix_web::test::read_body(res).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn test_tampered_cookie_falls_back_to_anonymous() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/", web::get().to(whoami)),
        )
        .await;

        let mut sealed = test_codec().seal("42").unwrap();
        sealed.replace_range(4..5, if &sealed[4..5] == "A" { "B" } else { "A" });
        let req = TestRequest::get()
            .uri("/")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, sealed))
            .to_request();
        let res = call_service(&app, req).await;

        assert!(res.status().is_success());
        assert!(set_cookie_headers(&res).is_empty());
        let body = actix_web::test::read_body(res).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn test_handler_set_identity_issues_cookie() {
        let app = init_service(
            App::new()
                .wrap(SessionMiddleware::new(&test_config()))
                .route("/login", web::get().to(login)),
        )
        .await;

        let res = call_service(&app, TestRequest::get().uri("/login").to_request()).await;

        let cookies = set_cookie_headers(&res);
        assert_eq!(cookies.len(), 1);

        let issued = Cookie::parse(cookies[0].clone()).unwrap();
        let (user_id, _) = test_codec().open_user_id(issued.value()).unwrap();
        assert_eq!(user_id, 42);
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("SameSite=Strict"));
    }
}
