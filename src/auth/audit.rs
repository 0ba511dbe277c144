//! Activity log for security-relevant auth events.
//!
//! Audit writes are best-effort: a failed insert is logged and swallowed so
//! it never turns a successful login into a 500.

use axum::http::HeaderMap;
use sqlx::PgPool;
use tracing::{warn, Instrument};
use uuid::Uuid;

/// Client metadata captured from request headers.
#[derive(Debug, Default, Clone)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip: extract_client_ip(headers),
            user_agent: headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Records an auth event. Never fails the caller.
pub async fn record(
    pool: &PgPool,
    account_id: Option<Uuid>,
    activity_type: &str,
    description: &str,
    meta: &RequestMeta,
) {
    let query = r"
        INSERT INTO activity_log (account_id, activity_type, description, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(activity_type)
        .bind(description)
        .bind(meta.ip.as_deref())
        .bind(meta.user_agent.as_deref())
        .execute(pool)
        .instrument(span)
        .await;

    if let Err(err) = result {
        warn!("failed to write activity log entry for {activity_type}: {err}");
    }
}

/// Extract a client IP from common proxy headers.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_first_forwarded_for_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        let meta = RequestMeta::from_headers(&headers);
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        let meta = RequestMeta::from_headers(&headers);
        assert_eq!(meta.ip.as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn missing_headers_yield_none() {
        let meta = RequestMeta::from_headers(&HeaderMap::new());
        assert_eq!(meta.ip, None);
        assert_eq!(meta.user_agent, None);
    }

    #[test]
    fn captures_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("curl/8.5"),
        );

        let meta = RequestMeta::from_headers(&headers);
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.5"));
    }
}
