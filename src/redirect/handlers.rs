use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{
        header::{HeaderMap, HeaderValue, HOST, LOCATION, SET_COOKIE, USER_AGENT},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RedirectConfig;
use crate::dispatch::{BackgroundDispatcher, BackgroundTask};
use crate::models::{generate_id, unix_now, LinkClickEvent};
use crate::storage::Storage;

pub const REFERRAL_COOKIE: &str = "referralCode";
/// 30 days
pub const REFERRAL_COOKIE_MAX_AGE: u64 = 2_592_000;

pub struct RedirectState {
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Arc<BackgroundDispatcher>,
    pub config: RedirectConfig,
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    #[serde(rename = "ref")]
    pub ref_id: Option<String>,
    pub url: Option<String>,
}

/// 307 to `location`, or to `/` if it cannot be sent as a header
fn temporary_redirect(location: &str) -> Response {
    let value = HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, value)]).into_response()
}

fn redirect_to_root() -> Response {
    temporary_redirect("/")
}

/// `Set-Cookie` value attributing the visitor to `partner_id`.
/// Skipped when the id is not a valid cookie value.
pub fn referral_cookie(partner_id: &str) -> Option<HeaderValue> {
    let valid = !partner_id.is_empty()
        && partner_id.bytes().all(|b| {
            b.is_ascii_graphic() && !matches!(b, b'"' | b',' | b';' | b'\\')
        });
    if !valid {
        return None;
    }

    HeaderValue::from_str(&format!(
        "{REFERRAL_COOKIE}={partner_id}; Path=/; Max-Age={REFERRAL_COOKIE_MAX_AGE}; SameSite=Lax"
    ))
    .ok()
}

fn with_referral_cookie(mut response: Response, partner_id: Option<&str>) -> Response {
    if let Some(cookie) = partner_id.and_then(referral_cookie) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Scheme and host of the current request, preferring the configured public URL
pub fn request_origin(headers: &HeaderMap, config: &RedirectConfig) -> Option<String> {
    if let Some(ref base) = config.public_base_url {
        return Some(base.clone());
    }

    let host = headers.get(HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| *p == "http" || *p == "https")
        .unwrap_or("http");

    Some(format!("{proto}://{host}"))
}

fn is_site_relative(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

/// Turn a stored destination into a redirect target.
///
/// Absolute http(s) URLs pass through, site-relative paths are expanded
/// against `origin`. Anything else is treated as malformed.
pub fn resolve_destination(raw: Option<&str>, origin: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    let resolved = if let Some(rest) = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
    {
        let host = rest.split(['/', '?', '#']).next().unwrap_or("");
        if host.is_empty() {
            return None;
        }
        raw.to_string()
    } else if is_site_relative(raw) {
        match origin {
            Some(origin) => format!("{}{}", origin.trim_end_matches('/'), raw),
            None => raw.to_string(),
        }
    } else {
        return None;
    };

    HeaderValue::from_str(&resolved).ok()?;
    Some(resolved)
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Add `ref=<ref_id>` to the query string unless a `ref` parameter is already there
pub fn append_ref_param(url: &str, ref_id: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };

    let has_ref = base
        .split_once('?')
        .map(|(_, query)| {
            query
                .split('&')
                .any(|pair| pair == "ref" || pair.starts_with("ref="))
        })
        .unwrap_or(false);

    if has_ref {
        return url.to_string();
    }

    let separator = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    let mut out = format!("{base}{separator}ref={}", encode_query_value(ref_id));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `/l` and `/l/` with no code
pub async fn missing_link_id() -> Response {
    (StatusCode::BAD_REQUEST, "Missing link id").into_response()
}

/// Resolve a shortlink and redirect to its destination
pub async fn resolve_shortlink(
    State(state): State<Arc<RedirectState>>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let link_id = link_id.trim();
    if link_id.is_empty() {
        return missing_link_id().await;
    }

    let link = match state.storage.get_shortlink(link_id).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            debug!(short_code = %link_id, "shortlink not found");
            return temporary_redirect(&state.config.not_found_path);
        }
        Err(e) => {
            warn!(short_code = %link_id, error = %e, "shortlink lookup failed, redirecting to root");
            return redirect_to_root();
        }
    };

    let origin = request_origin(&headers, &state.config);
    let Some(destination) = resolve_destination(link.destination_url.as_deref(), origin.as_deref())
    else {
        warn!(short_code = %link_id, "shortlink has no usable destination, redirecting to root");
        return redirect_to_root();
    };

    state.dispatcher.dispatch(BackgroundTask::RecordClick(LinkClickEvent {
        id: generate_id(20),
        partner_id: link.partner_id.clone(),
        target_url: destination.clone(),
        shortlink_id: Some(link.id.clone()),
        campaign: link.campaign.clone(),
        timestamp: unix_now(),
        user_agent: user_agent(&headers),
    }));

    with_referral_cookie(temporary_redirect(&destination), link.partner_id.as_deref())
}

/// Legacy direct-tracking links: `/track?ref=<partner>&url=<path>`
pub async fn track(
    State(state): State<Arc<RedirectState>>,
    query: Result<Query<TrackQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let Ok(Query(query)) = query else {
        return redirect_to_root();
    };

    let ref_id = query.ref_id.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let url = query.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let (Some(ref_id), Some(url)) = (ref_id, url) else {
        return redirect_to_root();
    };

    if !is_site_relative(url) {
        warn!(ref_id, url, "tracking link with non-relative destination, redirecting to root");
        return redirect_to_root();
    }

    let target = append_ref_param(url, ref_id);
    let origin = request_origin(&headers, &state.config);
    let Some(destination) = resolve_destination(Some(&target), origin.as_deref()) else {
        return redirect_to_root();
    };

    state.dispatcher.dispatch(BackgroundTask::RecordClick(LinkClickEvent {
        id: generate_id(20),
        partner_id: Some(ref_id.to_string()),
        target_url: destination.clone(),
        shortlink_id: None,
        campaign: None,
        timestamp: unix_now(),
        user_agent: user_agent(&headers),
    }));

    with_referral_cookie(temporary_redirect(&destination), Some(ref_id))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_destination() {
        let origin = Some("https://shop.example");

        assert_eq!(
            resolve_destination(Some("https://partner.example/x?y=1"), origin).as_deref(),
            Some("https://partner.example/x?y=1")
        );
        assert_eq!(
            resolve_destination(Some("/products/lamp"), origin).as_deref(),
            Some("https://shop.example/products/lamp")
        );
        assert_eq!(
            resolve_destination(Some("/products/lamp"), None).as_deref(),
            Some("/products/lamp")
        );

        assert_eq!(resolve_destination(None, origin), None);
        assert_eq!(resolve_destination(Some("   "), origin), None);
        assert_eq!(resolve_destination(Some("https://"), origin), None);
        assert_eq!(resolve_destination(Some("javascript:alert(1)"), origin), None);
        assert_eq!(resolve_destination(Some("//evil.example"), origin), None);
        assert_eq!(resolve_destination(Some("/\\evil.example"), origin), None);
        assert_eq!(resolve_destination(Some("/a b"), origin), None);
    }

    #[test]
    fn test_append_ref_param() {
        assert_eq!(append_ref_param("/shop", "p1"), "/shop?ref=p1");
        assert_eq!(append_ref_param("/shop?a=1", "p1"), "/shop?a=1&ref=p1");
        assert_eq!(append_ref_param("/shop?", "p1"), "/shop?ref=p1");
        assert_eq!(append_ref_param("/shop#top", "p1"), "/shop?ref=p1#top");
        assert_eq!(append_ref_param("/shop?ref=other", "p1"), "/shop?ref=other");
        assert_eq!(append_ref_param("/shop?preference=x", "p1"), "/shop?preference=x&ref=p1");
        assert_eq!(append_ref_param("/shop", "a b&c"), "/shop?ref=a%20b%26c");
    }

    #[test]
    fn test_referral_cookie() {
        let cookie = referral_cookie("partner-42").unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "referralCode=partner-42; Path=/; Max-Age=2592000; SameSite=Lax"
        );
        assert!(!cookie.to_str().unwrap().contains("HttpOnly"));

        assert!(referral_cookie("").is_none());
        assert!(referral_cookie("a;b").is_none());
        assert!(referral_cookie("a b").is_none());
    }

    #[test]
    fn test_request_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("shop.example"));
        assert_eq!(
            request_origin(&headers, &RedirectConfig::default()).as_deref(),
            Some("http://shop.example")
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(
            request_origin(&headers, &RedirectConfig::default()).as_deref(),
            Some("https://shop.example")
        );

        let config = RedirectConfig {
            public_base_url: Some("https://tradinta.example".to_string()),
            ..Default::default()
        };
        assert_eq!(
            request_origin(&headers, &config).as_deref(),
            Some("https://tradinta.example")
        );

        assert_eq!(request_origin(&HeaderMap::new(), &RedirectConfig::default()), None);
    }
}
