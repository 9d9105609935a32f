use crate::config::AuthConfig;
use crate::error::AppError;
use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// True when the request carries the admin session cookie issued by the
/// site's login flow. Issuing and revoking that cookie happens elsewhere.
pub fn is_admin(jar: &CookieJar, config: &AuthConfig) -> bool {
    jar.get(&config.admin_cookie)
        .map(|cookie| cookie.value() == config.admin_cookie_value)
        .unwrap_or(false)
}

/// Admin middleware for API routes. Expects `Arc<AuthConfig>` in the
/// request extensions and answers 401 JSON when the cookie is missing.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, Response> {
    let config = request
        .extensions()
        .get::<Arc<AuthConfig>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("auth config not configured".into()).into_response())?;

    let jar = CookieJar::from_headers(request.headers());
    if !is_admin(&jar, &config) {
        tracing::debug!(path = %request.uri().path(), "rejected non-admin request");
        return Err(AppError::Unauthorized.into_response());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};

    fn jar(cookie: &'static str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_admin_cookie_must_match() {
        let config = AuthConfig::default();
        assert!(is_admin(&jar("theme=dark; cms_admin=1"), &config));
        assert!(!is_admin(&jar("cms_admin=0"), &config));
        assert!(!is_admin(&jar("theme=dark"), &config));
        assert!(!is_admin(&CookieJar::new(), &config));
    }
}
