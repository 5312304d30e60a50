//! Per-user dashboard and per-link analytics endpoints.
//!
//! Each handler pulls the relevant click logs through the repository layer
//! and derives everything else with the pure functions in `analytics`. The
//! acting user id always comes from the verified bearer token. Dates on the
//! wire are UTC epoch-millisecond instants.

use crate::{analytics, auth::AuthUser, db, error::ApiError, models::ClickEvent, AppState};
use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DAY_MS: i64 = 24 * 3_600_000;

#[derive(Deserialize)]
pub struct WindowRequest {
    pub date_from: i64,
    pub date_to: i64,
}

#[derive(Deserialize)]
pub struct MyLinksRequest {
    /// Reference instant for the rolling 24 h / 7 d / 30 d windows.
    pub date_to_now: i64,
    /// Optional creation-time window restricting which links are listed.
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
}

#[derive(Deserialize)]
pub struct LinkStatsRequest {
    pub date_to_now: i64,
}

fn all_clicks(links: &[crate::models::LinkClicks]) -> Vec<ClickEvent> {
    links.iter().flat_map(|l| l.clicks.iter().cloned()).collect()
}

/// POST /api/v1/stats/dashboard
///
/// The home-dashboard facet set: daily graph, windowed total, new links,
/// device traffic, trending links, recent activity, and the hourly split.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<WindowRequest>,
) -> Result<Response, ApiError> {
    let links = db::get_link_clicks_for_creator(&state.db, auth.id()).await?;
    let clicks = all_clicks(&links);
    let windowed = analytics::filter_by_window(&clicks, req.date_from, req.date_to);

    let new_links =
        db::count_links_created_in_window(&state.db, auth.id(), req.date_from, req.date_to)
            .await?;

    Ok(super::success(json!({
        "main_graph": analytics::count_by_day(&windowed),
        "total_clicks": windowed.len(),
        "new_links": new_links,
        "traffic": analytics::count_by_device_class(&windowed),
        "trending_links": analytics::trending(&links, req.date_from, req.date_to),
        "recent_activity": analytics::recent_activity(&links, req.date_from, req.date_to),
        "clicks_by_hour": analytics::count_by_hour(&windowed),
        "date_from": req.date_from,
        "date_to": req.date_to,
    })))
}

/// POST /api/v1/stats/overview — daily and hourly splits across all the
/// user's links.
pub async fn overview(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<WindowRequest>,
) -> Result<Response, ApiError> {
    let links = db::get_link_clicks_for_creator(&state.db, auth.id()).await?;
    let clicks = all_clicks(&links);
    let windowed = analytics::filter_by_window(&clicks, req.date_from, req.date_to);

    Ok(super::success(json!({
        "clicks_by_day": analytics::count_by_day(&windowed),
        "clicks_by_hour": analytics::count_by_hour(&windowed),
        "date_from": req.date_from,
        "date_to": req.date_to,
    })))
}

/// POST /api/v1/stats/devices — device-class split across all the user's
/// links within the window.
pub async fn devices(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<WindowRequest>,
) -> Result<Response, ApiError> {
    let links = db::get_link_clicks_for_creator(&state.db, auth.id()).await?;
    let clicks = all_clicks(&links);
    let windowed = analytics::filter_by_window(&clicks, req.date_from, req.date_to);

    Ok(super::success(json!({
        "devices": analytics::count_by_device_class(&windowed),
    })))
}

/// POST /api/v1/stats/links — per-link rolling counts and unique visitors.
pub async fn my_links(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<MyLinksRequest>,
) -> Result<Response, ApiError> {
    let links = db::get_link_clicks_for_creator(&state.db, auth.id()).await?;

    let rows: Vec<serde_json::Value> = links
        .iter()
        .filter(|link| match (req.date_from, req.date_to) {
            (Some(from), Some(to)) => link.created_at >= from && link.created_at <= to,
            _ => true,
        })
        .map(|link| {
            let counts = analytics::windowed_counts(&link.clicks, req.date_to_now);
            json!({
                "id": link.id,
                "alias": link.alias,
                "long_url": link.long_url,
                "created_at": link.created_at,
                "last_24h": counts.last_24h,
                "last_7d": counts.last_7d,
                "last_30d": counts.last_30d,
                "total": counts.total,
                "unique_visitors": analytics::unique_visitors(&link.clicks, req.date_to_now),
            })
        })
        .collect();

    Ok(super::success(json!({ "links": rows })))
}

/// POST /api/v1/stats/link/:id — everything the edit view shows for a
/// single link.
pub async fn link_stats(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<LinkStatsRequest>,
) -> Result<Response, ApiError> {
    let link = db::get_link_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::link_id_not_found(id))?;

    let clicks = db::get_clicks_for_link(&state.db, id).await?;

    let counts = analytics::windowed_counts(&clicks, req.date_to_now);
    let last_week =
        analytics::filter_by_window(&clicks, req.date_to_now - 7 * DAY_MS, req.date_to_now);

    Ok(super::success(json!({
        "link": link,
        "counts": counts,
        "main_graph": analytics::count_by_day(&last_week),
        "device_split": analytics::count_by_device_class(&clicks),
        "browser_split": analytics::count_by_browser(&clicks),
        "platform_split": analytics::count_by_platform(&clicks),
        "geo_split": analytics::count_by_geo(&clicks),
        "unique_visitors": analytics::unique_visitors(&clicks, req.date_to_now),
    })))
}
