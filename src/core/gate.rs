use std::sync::Arc;

use poem::{
    http::{header, StatusCode},
    web::cookie::{Cookie, CookieJar},
    Endpoint, IntoResponse, Middleware, Request, Response, Result,
};
use uuid::Uuid;

use crate::{
    core::session::{get_session, remove_session},
    model::role::UserRole,
    repository::user::get_user_by_id,
    AppState,
};

pub const SESSION_COOKIE: &str = "hr_session";
pub const LOGIN_PATH: &str = "/login";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const FORBIDDEN_PATH: &str = "/403";

const ASSET_PREFIXES: [&str; 4] = ["/_next/", "/static/", "/assets/", "/favicon.ico"];
const PUBLIC_PATHS: [&str; 2] = [LOGIN_PATH, FORBIDDEN_PATH];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Active(UserRole),
    Inactive,
    /// Redis, Postgres or token lookup failed.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(&'static str),
    /// Drop the session and send the user back to the login page.
    SignOut,
}

/// Whether `path` goes through the gate at all.
pub fn is_gated_path(path: &str, api_prefix: &str) -> bool {
    let api_prefix = api_prefix.trim_end_matches('/');
    if !api_prefix.is_empty()
        && (path == api_prefix || path.starts_with(&format!("{}/", api_prefix)))
    {
        return false;
    }
    if path.starts_with("/docs") || path == "/openapi.json" {
        return false;
    }
    if ASSET_PREFIXES.iter().any(|x| path.starts_with(x)) {
        return false;
    }
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    !last_segment.contains('.')
}

fn is_admin_path(path: &str) -> bool {
    path == "/admin" || path.starts_with("/admin/")
}

pub fn decide(path: &str, session: &SessionStatus) -> GateDecision {
    let is_public = PUBLIC_PATHS.contains(&path);
    match session {
        SessionStatus::Inactive => GateDecision::SignOut,
        SessionStatus::Error | SessionStatus::Anonymous => {
            if is_public {
                GateDecision::Pass
            } else {
                GateDecision::Redirect(LOGIN_PATH)
            }
        }
        SessionStatus::Active(role) => {
            if path == LOGIN_PATH || path == "/" {
                GateDecision::Redirect(DASHBOARD_PATH)
            } else if is_admin_path(path) && !role.is_hr_admin() {
                GateDecision::Redirect(FORBIDDEN_PATH)
            } else {
                GateDecision::Pass
            }
        }
    }
}

/// Session token from the session cookie, falling back to a bearer header.
pub fn session_token(req: &Request) -> Option<String> {
    if let Some(cookie) = req.cookie().get(SESSION_COOKIE) {
        let value = cookie.value_str().to_string();
        if !value.is_empty() {
            return Some(value);
        }
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|x| x.to_str().ok())
        .and_then(|x| x.strip_prefix("Bearer "))
        .map(|x| x.trim().to_string())
}

pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> Cookie {
    let mut cookie = Cookie::new_with_str(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_max_age(std::time::Duration::from_secs(max_age_secs));
    cookie
}

pub fn clear_session_cookie(jar: &CookieJar) {
    jar.remove(SESSION_COOKIE);
}

fn redirect(to: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, to)
        .finish()
}

/// Routing gate for the page routes served next to the API.
pub struct RoleGate {
    state: Arc<AppState>,
    api_prefix: String,
}

impl RoleGate {
    pub fn new(state: Arc<AppState>, api_prefix: &str) -> Self {
        Self {
            state,
            api_prefix: api_prefix.to_string(),
        }
    }
}

impl<E: Endpoint> Middleware<E> for RoleGate {
    type Output = RoleGateEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RoleGateEndpoint {
            inner: ep,
            state: self.state.clone(),
            api_prefix: self.api_prefix.clone(),
        }
    }
}

pub struct RoleGateEndpoint<E> {
    inner: E,
    state: Arc<AppState>,
    api_prefix: String,
}

impl<E> RoleGateEndpoint<E> {
    async fn session_status(&self, token: Option<String>) -> SessionStatus {
        let token = match token {
            Some(val) => val,
            None => return SessionStatus::Anonymous,
        };
        let mut redis_conn = match self.state.redis_conn.get() {
            Ok(val) => val,
            Err(err) => {
                tracing::warn!("gate: get redis pool connection: {}", err);
                return SessionStatus::Error;
            }
        };
        let session = match get_session(&mut redis_conn, token) {
            Ok(Some(val)) => val,
            Ok(None) => return SessionStatus::Anonymous,
            Err(err) => {
                tracing::warn!("gate: get session: {}", err);
                return SessionStatus::Error;
            }
        };
        let user_id = match Uuid::parse_str(&session.user_id) {
            Ok(val) => val,
            Err(_) => return SessionStatus::Error,
        };
        let mut tx = match self.state.db.begin().await {
            Ok(val) => val,
            Err(err) => {
                tracing::warn!("gate: begin transaction: {}", err);
                return SessionStatus::Error;
            }
        };
        match get_user_by_id(&mut tx, &user_id).await {
            Ok(Some(user)) if user.is_active => SessionStatus::Active(user.role),
            Ok(Some(_)) => SessionStatus::Inactive,
            Ok(None) => SessionStatus::Anonymous,
            Err(err) => {
                tracing::warn!("gate: get user: {}", err);
                SessionStatus::Error
            }
        }
    }
}

impl<E: Endpoint> Endpoint for RoleGateEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        let path = req.uri().path().to_string();
        if !is_gated_path(&path, &self.api_prefix) {
            return self.inner.call(req).await.map(IntoResponse::into_response);
        }
        let token = session_token(&req);
        let status = self.session_status(token.clone()).await;
        match decide(&path, &status) {
            GateDecision::Pass => self.inner.call(req).await.map(IntoResponse::into_response),
            GateDecision::Redirect(to) => {
                tracing::debug!("gate: {} -> {} ({:?})", path, to, status);
                Ok(redirect(to))
            }
            GateDecision::SignOut => {
                tracing::info!("gate: signing out inactive user");
                if let (Some(token), Ok(mut redis_conn)) = (token, self.state.redis_conn.get()) {
                    if let Err(err) = remove_session(&mut redis_conn, token) {
                        tracing::warn!("gate: remove session: {}", err);
                    }
                }
                clear_session_cookie(req.cookie());
                Ok(redirect(LOGIN_PATH))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gated_paths() {
        assert!(is_gated_path("/dashboard", "/api"));
        assert!(is_gated_path("/admin/users", "/api"));
        assert!(is_gated_path("/", "/api"));
        assert!(!is_gated_path("/api/employees", "/api"));
        assert!(!is_gated_path("/api", "/api"));
        assert!(is_gated_path("/apis", "/api"));
        assert!(!is_gated_path("/_next/static/chunk.js", "/api"));
        assert!(!is_gated_path("/favicon.ico", "/api"));
        assert!(!is_gated_path("/logo.png", "/api"));
        assert!(!is_gated_path("/docs", "/api"));
        assert!(!is_gated_path("/openapi.json", "/api"));
    }

    #[test]
    fn test_unauthenticated_is_sent_to_login() {
        assert_eq!(
            decide("/dashboard", &SessionStatus::Anonymous),
            GateDecision::Redirect(LOGIN_PATH)
        );
        assert_eq!(
            decide("/admin/columns", &SessionStatus::Anonymous),
            GateDecision::Redirect(LOGIN_PATH)
        );
        assert_eq!(decide("/login", &SessionStatus::Anonymous), GateDecision::Pass);
        assert_eq!(decide("/403", &SessionStatus::Anonymous), GateDecision::Pass);
    }

    #[test]
    fn test_authenticated_login_goes_to_dashboard() {
        let status = SessionStatus::Active(UserRole::Payroll);
        assert_eq!(decide("/login", &status), GateDecision::Redirect(DASHBOARD_PATH));
        assert_eq!(decide("/", &status), GateDecision::Redirect(DASHBOARD_PATH));
        assert_eq!(decide("/dashboard", &status), GateDecision::Pass);
    }

    #[test]
    fn test_admin_paths_require_hr_admin() {
        for role in UserRole::ALL {
            let expected = if role.is_hr_admin() {
                GateDecision::Pass
            } else {
                GateDecision::Redirect(FORBIDDEN_PATH)
            };
            assert_eq!(decide("/admin", &SessionStatus::Active(role)), expected);
            assert_eq!(decide("/admin/users", &SessionStatus::Active(role)), expected);
        }
        assert_eq!(
            decide("/administration", &SessionStatus::Active(UserRole::Sodexo)),
            GateDecision::Pass
        );
    }

    #[test]
    fn test_inactive_user_is_signed_out() {
        assert_eq!(decide("/dashboard", &SessionStatus::Inactive), GateDecision::SignOut);
        assert_eq!(decide("/login", &SessionStatus::Inactive), GateDecision::SignOut);
    }

    #[test]
    fn test_lookup_error_fails_closed() {
        assert_eq!(
            decide("/dashboard", &SessionStatus::Error),
            GateDecision::Redirect(LOGIN_PATH)
        );
        assert_eq!(
            decide("/admin", &SessionStatus::Error),
            GateDecision::Redirect(LOGIN_PATH)
        );
    }
}
