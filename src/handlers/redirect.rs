use crate::{
    analytics, db,
    error::ApiError,
    geo,
    models::{ClickEvent, UserAgentFlags},
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc};
use woothee::parser::Parser;

/// GET /:alias
///
/// 1. Resolve the alias via the in-memory cache (fast path — no DB hit),
///    falling back to the database and backfilling the cache.
/// 2. Resolve geo for the caller IP (cache-first); a failed lookup records
///    the "not recognized" sentinel.
/// 3. Append the click event — one row INSERT, so concurrent clicks on the
///    same link can never overwrite one another — before responding.
/// 4. Return a 307 redirect to the scheme-normalized long URL.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(alias): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // ── 1. Resolve URL ─────────────────────────────────────────────────────
    let target = match state.cache.get(&alias) {
        Some(cached) => cached,
        None => {
            let link = db::get_link_by_alias(&state.db, &alias)
                .await?
                .ok_or_else(|| ApiError::link_not_found(&alias))?;
            // Backfill the cache for next time
            state.cache.set(&link.alias, link.id, &link.long_url);
            crate::cache::CachedLink {
                id: link.id,
                long_url: link.long_url,
            }
        }
    };

    // ── 2. Request metadata ────────────────────────────────────────────────
    let ip = super::extract_ip(&headers, addr);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let flags = parse_ua_flags(user_agent.as_deref());

    let country = geo::lookup(&ip, &state.config.geo_api_url, &state.geo_cache)
        .await
        .unwrap_or_else(|| geo::NOT_RECOGNIZED.to_owned());

    // ── 3. Append the click ────────────────────────────────────────────────
    let now = Utc::now().timestamp_millis();
    let event = ClickEvent {
        ip,
        geo: country,
        flags,
        clicked_at: now,
        clicked_day: analytics::iso_day(now),
    };
    db::append_click(&state.db, target.id, &event).await?;

    // ── 4. Redirect ────────────────────────────────────────────────────────
    let destination = normalize_redirect_url(&target.long_url);
    Ok(Redirect::temporary(&destination).into_response())
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Prefix `http://` unless the URL already carries a recognized scheme.
pub fn normalize_redirect_url(long_url: &str) -> String {
    if long_url.starts_with("http://") || long_url.starts_with("https://") {
        long_url.to_owned()
    } else {
        format!("http://{long_url}")
    }
}

/// Fold a User-Agent string into the boolean capability flags stored per
/// click. Unparseable or absent UA strings leave every flag false.
pub fn parse_ua_flags(ua: Option<&str>) -> UserAgentFlags {
    let ua = match ua {
        Some(s) if !s.is_empty() => s,
        _ => return UserAgentFlags::default(),
    };

    let parser = Parser::new();
    let Some(result) = parser.parse(ua) else {
        return UserAgentFlags::default();
    };

    let mut flags = UserAgentFlags::default();

    match result.category {
        "smartphone" | "mobilephone" => flags.is_mobile = true,
        "pc" => flags.is_desktop = true,
        _ => {}
    }

    match result.name {
        "Chrome" => flags.is_chrome = true,
        "Firefox" => flags.is_firefox = true,
        "Safari" => flags.is_safari = true,
        "Opera" => flags.is_opera = true,
        "Internet Explorer" => flags.is_ie = true,
        _ => {}
    }

    match result.os {
        "iPhone" | "iPad" => flags.is_iphone = true,
        "Android" => flags.is_android = true,
        _ => {}
    }

    flags
}
