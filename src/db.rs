//! Repository layer over SQLite.
//!
//! Everything the handlers need is an explicit named query here — there is
//! no implicit query interception, so e.g. "active users only" is visible
//! in the function name (`find_active_*`), not hidden in a hook.

use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::{
    cache::LinkCache,
    models::{ClickEvent, ClickRow, Link, LinkClicks, LinkWithStats, User},
};

const LINK_COLUMNS: &str =
    "id, alias, long_url, creator_ip, is_random_alias, creator_id, created_at";

const USER_COLUMNS: &str = "id, name, email, password_hash, role, password_changed_at, \
     password_reset_token, password_reset_expires, active, created_at";

// ── Warm-up ────────────────────────────────────────────────────────────────

/// Load every link into the in-memory cache at startup.
pub async fn warm_cache(pool: &SqlitePool, cache: &LinkCache) -> anyhow::Result<()> {
    let links: Vec<Link> = sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links"))
        .fetch_all(pool)
        .await?;

    let count = links.len();
    for link in links {
        cache.set(link.alias, link.id, link.long_url);
    }

    tracing::info!("Cache warmed with {} link(s)", count);
    Ok(())
}

// ── Links ──────────────────────────────────────────────────────────────────

/// Insert a new link and return the newly created row.
pub async fn create_link(
    pool: &SqlitePool,
    alias: &str,
    long_url: &str,
    creator_ip: Option<&str>,
    is_random_alias: bool,
    creator_id: Option<i64>,
    created_at: i64,
) -> Result<Link, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO links (alias, long_url, creator_ip, is_random_alias, creator_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(alias)
    .bind(long_url)
    .bind(creator_ip)
    .bind(is_random_alias)
    .bind(creator_id)
    .bind(created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let link: Link = sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"))
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(link)
}

/// Fetch a single link by its alias.
pub async fn get_link_by_alias(
    pool: &SqlitePool,
    alias: &str,
) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE alias = ?1"))
        .bind(alias)
        .fetch_optional(pool)
        .await
}

/// Fetch a single link by its primary key.
pub async fn get_link_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// `true` if the alias is already taken.
pub async fn alias_exists(pool: &SqlitePool, alias: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE alias = ?1")
        .bind(alias)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// A user's links joined with their total click counts, newest first.
pub async fn get_links_with_stats(
    pool: &SqlitePool,
    creator_id: i64,
) -> Result<Vec<LinkWithStats>, sqlx::Error> {
    sqlx::query_as(
        "SELECT l.id,
                l.alias,
                l.long_url,
                l.is_random_alias,
                l.created_at,
                COUNT(c.id) AS click_count
         FROM links l
         LEFT JOIN clicks c ON c.link_id = l.id
         WHERE l.creator_id = ?1
         GROUP BY l.id
         ORDER BY l.created_at DESC",
    )
    .bind(creator_id)
    .fetch_all(pool)
    .await
}

/// Owner-approved update of a link's destination. The alias is immutable,
/// so the destination is the only mutable column.
pub async fn update_link_long_url(
    pool: &SqlitePool,
    id: i64,
    long_url: &str,
) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query("UPDATE links SET long_url = ?1 WHERE id = ?2")
        .bind(long_url)
        .bind(id)
        .execute(pool)
        .await?;

    get_link_by_id(pool, id).await
}

/// How many of a user's links were created inside the window.
pub async fn count_links_created_in_window(
    pool: &SqlitePool,
    creator_id: i64,
    from: i64,
    to: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM links
         WHERE creator_id = ?1 AND created_at >= ?2 AND created_at <= ?3",
    )
    .bind(creator_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
}

// ── Clicks ─────────────────────────────────────────────────────────────────

/// Append one click event to a link's log.
///
/// A single row INSERT is the storage layer's atomic append: concurrent
/// clicks on the same link serialize here and none is lost.
pub async fn append_click(
    pool: &SqlitePool,
    link_id: i64,
    event: &ClickEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO clicks
             (link_id, ip, geo, is_mobile, is_desktop, is_chrome, is_firefox,
              is_safari, is_opera, is_ie, is_iphone, is_android, clicked_at, clicked_day)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(link_id)
    .bind(&event.ip)
    .bind(&event.geo)
    .bind(event.flags.is_mobile)
    .bind(event.flags.is_desktop)
    .bind(event.flags.is_chrome)
    .bind(event.flags.is_firefox)
    .bind(event.flags.is_safari)
    .bind(event.flags.is_opera)
    .bind(event.flags.is_ie)
    .bind(event.flags.is_iphone)
    .bind(event.flags.is_android)
    .bind(event.clicked_at)
    .bind(&event.clicked_day)
    .execute(pool)
    .await?;

    Ok(())
}

const CLICK_COLUMNS: &str = "link_id, ip, geo, is_mobile, is_desktop, is_chrome, is_firefox, \
     is_safari, is_opera, is_ie, is_iphone, is_android, clicked_at, clicked_day";

/// Full click log for one link, in insertion (= chronological) order.
pub async fn get_clicks_for_link(
    pool: &SqlitePool,
    link_id: i64,
) -> Result<Vec<ClickEvent>, sqlx::Error> {
    let rows: Vec<ClickRow> = sqlx::query_as(&format!(
        "SELECT {CLICK_COLUMNS} FROM clicks WHERE link_id = ?1 ORDER BY id"
    ))
    .bind(link_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ClickRow::into_event).collect())
}

/// Every link a user owns, each with its full click log, for the
/// cross-link aggregations (trending, recent activity, rolling counts).
/// Links with no clicks are included with an empty log.
pub async fn get_link_clicks_for_creator(
    pool: &SqlitePool,
    creator_id: i64,
) -> Result<Vec<LinkClicks>, sqlx::Error> {
    let links: Vec<Link> = sqlx::query_as(&format!(
        "SELECT {LINK_COLUMNS} FROM links WHERE creator_id = ?1 ORDER BY created_at DESC"
    ))
    .bind(creator_id)
    .fetch_all(pool)
    .await?;

    let rows: Vec<ClickRow> = sqlx::query_as(&format!(
        "SELECT c.link_id, c.ip, c.geo, c.is_mobile, c.is_desktop, c.is_chrome, c.is_firefox,
                c.is_safari, c.is_opera, c.is_ie, c.is_iphone, c.is_android,
                c.clicked_at, c.clicked_day
         FROM clicks c
         JOIN links l ON l.id = c.link_id
         WHERE l.creator_id = ?1
         ORDER BY c.id"
    ))
    .bind(creator_id)
    .fetch_all(pool)
    .await?;

    let mut by_link: HashMap<i64, Vec<ClickEvent>> = HashMap::new();
    for row in rows {
        let link_id = row.link_id;
        by_link.entry(link_id).or_default().push(row.into_event());
    }

    Ok(links
        .into_iter()
        .map(|link| LinkClicks {
            clicks: by_link.remove(&link.id).unwrap_or_default(),
            id: link.id,
            alias: link.alias,
            created_at: link.created_at,
            long_url: link.long_url,
        })
        .collect())
}

// ── Users ──────────────────────────────────────────────────────────────────

/// Insert a new user and return the created row.
pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
    role: &str,
    created_at: i64,
) -> Result<User, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO users (name, email, password_hash, role, active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .bind(created_at)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let user: User = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(user)
}

/// `true` if the (lowercased) email is already registered, active or not.
pub async fn email_exists(pool: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn find_active_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 AND active = 1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn find_active_user_by_id(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND active = 1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All active users, oldest first.
pub async fn find_active_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE active = 1 ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

/// Update the profile fields a user may edit about themselves.
pub async fn update_user_profile(
    pool: &SqlitePool,
    id: i64,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<User>, sqlx::Error> {
    if let Some(name) = name {
        sqlx::query("UPDATE users SET name = ?1 WHERE id = ?2")
            .bind(name)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(email) = email {
        sqlx::query("UPDATE users SET email = ?1 WHERE id = ?2")
            .bind(email)
            .bind(id)
            .execute(pool)
            .await?;
    }
    find_active_user_by_id(pool, id).await
}

/// Soft-delete: the row stays (links keep their creator reference) but the
/// user disappears from every `find_active_*` query.
pub async fn deactivate_user(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET active = 0 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Set a new password hash, stamp the change instant, and clear any
/// outstanding reset token (it must not survive a successful change).
pub async fn set_password(
    pool: &SqlitePool,
    id: i64,
    password_hash: &str,
    changed_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users
         SET password_hash = ?1,
             password_changed_at = ?2,
             password_reset_token = NULL,
             password_reset_expires = NULL
         WHERE id = ?3",
    )
    .bind(password_hash)
    .bind(changed_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store the one-way digest of a freshly issued reset token.
pub async fn set_reset_token(
    pool: &SqlitePool,
    id: i64,
    token_hash: &str,
    expires: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET password_reset_token = ?1, password_reset_expires = ?2 WHERE id = ?3",
    )
    .bind(token_hash)
    .bind(expires)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Drop reset-token state (mail failure or token consumption).
pub async fn clear_reset_token(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET password_reset_token = NULL, password_reset_expires = NULL WHERE id = ?1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Find the active user holding an unexpired reset token with this digest.
pub async fn find_user_by_reset_token(
    pool: &SqlitePool,
    token_hash: &str,
    now: i64,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE password_reset_token = ?1
           AND password_reset_expires > ?2
           AND active = 1"
    ))
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await
}
