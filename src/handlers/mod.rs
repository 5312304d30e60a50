pub mod auth;
pub mod links;
pub mod redirect;
pub mod stats;
pub mod users;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;

/// The success envelope every endpoint responds with:
/// `{"status":"success","data":...}`.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

pub(crate) fn success<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            status: "success",
            data,
        }),
    )
        .into_response()
}

pub(crate) fn created<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(Envelope {
            status: "success",
            data,
        }),
    )
        .into_response()
}

/// Determine the real client IP, preferring common proxy headers.
pub(crate) fn extract_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = xff.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_owned();
        }
    }

    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "9.9.9.9:443".parse().unwrap()
    }

    #[test]
    fn forwarded_for_wins_over_socket_addr() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_ip(&headers, addr()), "1.2.3.4");
    }

    #[test]
    fn real_ip_is_second_choice() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(extract_ip(&headers, addr()), "5.6.7.8");
    }

    #[test]
    fn socket_addr_is_the_fallback() {
        assert_eq!(extract_ip(&HeaderMap::new(), addr()), "9.9.9.9");
    }
}
