//! Request-scoped session value object
//!
//! Exactly one `Session` exists per request. The middleware creates it before
//! the handler runs, places it in the request extensions, and drains its
//! pending cookie write on the outbound path. Handles are `Rc`-based and must
//! never leave the request that created them.

use std::cell::RefCell;
use std::future::{ready, Ready};
use std::rc::Rc;

use actix_web::dev::Payload;
use actix_web::{error::ErrorInternalServerError, FromRequest, HttpMessage, HttpRequest};

#[derive(Debug, Default)]
struct SessionInner {
    user_id: Option<i64>,
    valid: bool,
    /// Queued cookie re-issue, applied by the middleware after the handler
    /// returns. Latest identity wins; at most one Set-Cookie per request.
    pending_issue: Option<i64>,
}

/// Authentication state of one in-flight request
///
/// Cloning yields another handle to the same per-request state; the handler
/// and the middleware observe each other's mutations through it.
#[derive(Clone, Debug, Default)]
pub struct Session {
    inner: Rc<RefCell<SessionInner>>,
}

impl Session {
    /// Session seeded from a successfully decoded cookie
    pub(crate) fn authenticated(user_id: i64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SessionInner {
                user_id: Some(user_id),
                valid: true,
                pending_issue: None,
            })),
        }
    }

    /// Session for a request without a usable cookie
    pub(crate) fn anonymous() -> Self {
        Self::default()
    }

    /// Whether a trustworthy identity was established for this request
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.borrow().valid
    }

    /// The established user id, set iff the session is valid
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.inner.borrow().user_id
    }

    /// Whether the session confers the named permission
    ///
    /// Current policy: any valid session grants every permission. There is no
    /// per-permission model; this is a documented simplification, not a
    /// security guarantee.
    #[must_use]
    pub fn allow(&self, _permission: &str) -> bool {
        self.is_valid()
    }

    /// Establish the identity for this request and queue a cookie re-issue
    ///
    /// Sets the user id, marks the session valid, and records a pending
    /// cookie write that the middleware applies to the response after the
    /// handler returns. Safe to call multiple times; state is idempotent for
    /// the same id and the queued write always carries the latest id.
    pub fn set_identity(&self, user_id: i64) {
        let mut inner = self.inner.borrow_mut();
        inner.user_id = Some(user_id);
        inner.valid = true;
        inner.pending_issue = Some(user_id);
    }

    /// Drain the queued cookie write, if any
    pub(crate) fn take_pending_issue(&self) -> Option<i64> {
        self.inner.borrow_mut().pending_issue.take()
    }

    /// Retrieve the session placed by the middleware for this request
    ///
    /// Returns `None` when no session was placed, i.e. the handler was
    /// invoked outside the middleware chain. This is the sole path by which
    /// downstream handlers obtain the session.
    #[must_use]
    pub fn extract(req: &HttpRequest) -> Option<Self> {
        req.extensions().get::<Self>().cloned()
    }
}

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::extract(req).ok_or_else(|| {
            log::error!("session requested but SessionMiddleware is not installed");
            ErrorInternalServerError("session middleware not installed")
        }))
    }
}
