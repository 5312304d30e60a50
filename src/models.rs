use serde::Serialize;

/// A short link record from the `links` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Link {
    pub id: i64,
    pub alias: String,
    pub long_url: String,
    pub creator_ip: Option<String>,
    pub is_random_alias: bool,
    pub creator_id: Option<i64>,
    /// UTC epoch milliseconds.
    pub created_at: i64,
}

/// A link row joined with its total click count, used by the list endpoint.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LinkWithStats {
    pub id: i64,
    pub alias: String,
    pub long_url: String,
    pub is_random_alias: bool,
    pub created_at: i64,
    pub click_count: i64,
}

/// Boolean capability flags derived from the User-Agent string.
///
/// These are what the aggregation engine groups on, so they are stored
/// per click rather than re-parsed from a raw UA string at query time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserAgentFlags {
    pub is_mobile: bool,
    pub is_desktop: bool,
    pub is_chrome: bool,
    pub is_firefox: bool,
    pub is_safari: bool,
    pub is_opera: bool,
    pub is_ie: bool,
    pub is_iphone: bool,
    pub is_android: bool,
}

/// One recorded redirect traversal. Append-only: built once in the click
/// recorder and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    pub ip: String,
    /// Country name, or `"not recognized"` when the geo lookup failed.
    pub geo: String,
    pub flags: UserAgentFlags,
    /// UTC epoch milliseconds.
    pub clicked_at: i64,
    /// ISO calendar day ("YYYY-MM-DD") derived from `clicked_at` in UTC.
    pub clicked_day: String,
}

/// A click row as stored, flat for `sqlx::FromRow`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClickRow {
    pub link_id: i64,
    pub ip: String,
    pub geo: String,
    pub is_mobile: bool,
    pub is_desktop: bool,
    pub is_chrome: bool,
    pub is_firefox: bool,
    pub is_safari: bool,
    pub is_opera: bool,
    pub is_ie: bool,
    pub is_iphone: bool,
    pub is_android: bool,
    pub clicked_at: i64,
    pub clicked_day: String,
}

impl ClickRow {
    pub fn into_event(self) -> ClickEvent {
        ClickEvent {
            ip: self.ip,
            geo: self.geo,
            flags: UserAgentFlags {
                is_mobile: self.is_mobile,
                is_desktop: self.is_desktop,
                is_chrome: self.is_chrome,
                is_firefox: self.is_firefox,
                is_safari: self.is_safari,
                is_opera: self.is_opera,
                is_ie: self.is_ie,
                is_iphone: self.is_iphone,
                is_android: self.is_android,
            },
            clicked_at: self.clicked_at,
            clicked_day: self.clicked_day,
        }
    }
}

/// A link together with its (possibly windowed) click log, the unit the
/// aggregation engine's cross-link operations work on.
#[derive(Debug, Clone)]
pub struct LinkClicks {
    pub id: i64,
    pub alias: String,
    pub created_at: i64,
    pub long_url: String,
    pub clicks: Vec<ClickEvent>,
}

// ── Users ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

/// A user row from the `users` table. Never serialized directly — the
/// password hash and reset-token state must not leave the process.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub password_changed_at: Option<i64>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<i64>,
    pub active: bool,
    pub created_at: i64,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_str(&self.role)
    }

    /// The response-safe view of a user.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: i64,
}
