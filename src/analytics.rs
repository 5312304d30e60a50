//! Click-log aggregation engine.
//!
//! Pure functions over in-memory click collections: the repository layer
//! fetches a link's (or a user's) click log and the functions here derive
//! windowed statistics from it. Nothing in this module reads or writes
//! storage. Aggregation is not isolated from concurrent click appends — a
//! stat may omit a click that lands mid-read; it shows up on the next read.
//!
//! Timezone convention: UTC throughout. Day buckets are ISO "YYYY-MM-DD"
//! strings (lexicographic order == chronological order), hour buckets are
//! the UTC hour 0–23. Hours and days with no clicks are absent from the
//! output maps, not zero-filled; every endpoint uses the same convention.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::models::{ClickEvent, LinkClicks};

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Render the ISO calendar day ("YYYY-MM-DD") of a UTC epoch-millisecond
/// instant. The click recorder uses this at append time so the stored day
/// string and the aggregation buckets can never disagree.
pub fn iso_day(epoch_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(epoch_ms) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

/// Keep events with `from <= clicked_at <= to`.
///
/// An inverted window (`from > to`) matches nothing and yields an empty
/// vector — never an error.
pub fn filter_by_window(clicks: &[ClickEvent], from: i64, to: i64) -> Vec<ClickEvent> {
    clicks
        .iter()
        .filter(|c| c.clicked_at >= from && c.clicked_at <= to)
        .cloned()
        .collect()
}

/// Clicks per ISO day, ascending by day (BTreeMap iteration order).
pub fn count_by_day(clicks: &[ClickEvent]) -> BTreeMap<String, u64> {
    let mut days = BTreeMap::new();
    for click in clicks {
        *days.entry(click.clicked_day.clone()).or_insert(0) += 1;
    }
    days
}

/// Clicks per UTC hour (0–23). Hours without clicks are absent.
pub fn count_by_hour(clicks: &[ClickEvent]) -> BTreeMap<u32, u64> {
    let mut hours = BTreeMap::new();
    for click in clicks {
        if let Some(dt) = DateTime::<Utc>::from_timestamp_millis(click.clicked_at) {
            *hours.entry(dt.hour()).or_insert(0) += 1;
        }
    }
    hours
}

/// One row of a device-class split: the `(mobile, desktop)` flag pair and
/// how many clicks carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceClassCount {
    pub mobile: bool,
    pub desktop: bool,
    pub clicks: u64,
}

/// Clicks grouped by the `(is_mobile, is_desktop)` flag pair, in a fixed
/// flag order so output is deterministic.
pub fn count_by_device_class(clicks: &[ClickEvent]) -> Vec<DeviceClassCount> {
    let mut groups: BTreeMap<(bool, bool), u64> = BTreeMap::new();
    for click in clicks {
        *groups
            .entry((click.flags.is_mobile, click.flags.is_desktop))
            .or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((mobile, desktop), clicks)| DeviceClassCount {
            mobile,
            desktop,
            clicks,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrowserClassCount {
    pub chrome: bool,
    pub opera: bool,
    pub ie: bool,
    pub safari: bool,
    pub firefox: bool,
    pub clicks: u64,
}

/// Clicks grouped by the browser flag tuple.
pub fn count_by_browser(clicks: &[ClickEvent]) -> Vec<BrowserClassCount> {
    let mut groups: BTreeMap<(bool, bool, bool, bool, bool), u64> = BTreeMap::new();
    for click in clicks {
        let f = click.flags;
        *groups
            .entry((f.is_chrome, f.is_opera, f.is_ie, f.is_safari, f.is_firefox))
            .or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((chrome, opera, ie, safari, firefox), clicks)| BrowserClassCount {
            chrome,
            opera,
            ie,
            safari,
            firefox,
            clicks,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformClassCount {
    pub iphone: bool,
    pub android: bool,
    pub clicks: u64,
}

/// Clicks grouped by the `(is_iphone, is_android)` flag pair.
pub fn count_by_platform(clicks: &[ClickEvent]) -> Vec<PlatformClassCount> {
    let mut groups: BTreeMap<(bool, bool), u64> = BTreeMap::new();
    for click in clicks {
        *groups
            .entry((click.flags.is_iphone, click.flags.is_android))
            .or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((iphone, android), clicks)| PlatformClassCount {
            iphone,
            android,
            clicks,
        })
        .collect()
}

/// Clicks per country name (including the "not recognized" sentinel).
pub fn count_by_geo(clicks: &[ClickEvent]) -> BTreeMap<String, u64> {
    let mut countries = BTreeMap::new();
    for click in clicks {
        *countries.entry(click.geo.clone()).or_insert(0) += 1;
    }
    countries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingEntry {
    pub alias: String,
    pub id: i64,
    pub clicks: u64,
}

/// Rank links by click count within the window, descending; ties broken by
/// alias ascending so repeated calls on unchanged input give the same
/// order. Links with no clicks in the window are omitted.
pub fn trending(links: &[LinkClicks], from: i64, to: i64) -> Vec<TrendingEntry> {
    let mut entries: Vec<TrendingEntry> = links
        .iter()
        .filter_map(|link| {
            let clicks = link
                .clicks
                .iter()
                .filter(|c| c.clicked_at >= from && c.clicked_at <= to)
                .count() as u64;
            (clicks > 0).then(|| TrendingEntry {
                alias: link.alias.clone(),
                id: link.id,
                clicks,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.alias.cmp(&b.alias)));
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub time: i64,
    pub alias: String,
    pub id: i64,
}

/// Every click within the window as `(time, alias, id)`, newest first.
pub fn recent_activity(links: &[LinkClicks], from: i64, to: i64) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = links
        .iter()
        .flat_map(|link| {
            link.clicks
                .iter()
                .filter(|c| c.clicked_at >= from && c.clicked_at <= to)
                .map(|c| ActivityEntry {
                    time: c.clicked_at,
                    alias: link.alias.clone(),
                    id: link.id,
                })
        })
        .collect();

    entries.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.alias.cmp(&b.alias)));
    entries
}

/// Count of distinct IP addresses among clicks at or before the cutoff.
pub fn unique_visitors(clicks: &[ClickEvent], cutoff: i64) -> u64 {
    let ips: HashSet<&str> = clicks
        .iter()
        .filter(|c| c.clicked_at <= cutoff)
        .map(|c| c.ip.as_str())
        .collect();
    ips.len() as u64
}

/// Rolling counts relative to a reference instant, all derived in a single
/// pass over the click log.
///
/// Invariant: `last_24h <= last_7d <= last_30d <= total` for any input,
/// since each window is contained in the next and `total` is unwindowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowedCounts {
    pub last_24h: u64,
    pub last_7d: u64,
    pub last_30d: u64,
    pub total: u64,
}

pub fn windowed_counts(clicks: &[ClickEvent], now: i64) -> WindowedCounts {
    let mut counts = WindowedCounts::default();
    for click in clicks {
        counts.total += 1;
        let t = click.clicked_at;
        if t > now {
            continue;
        }
        if t >= now - 30 * DAY_MS {
            counts.last_30d += 1;
        }
        if t >= now - 7 * DAY_MS {
            counts.last_7d += 1;
        }
        if t >= now - DAY_MS {
            counts.last_24h += 1;
        }
    }
    counts
}
