use super::middleware::*;
use std::net::{IpAddr, Ipv4Addr};

#[test]
fn test_rate_limiter_burst_then_reject() {
    let limiter = ApiRateLimiter::new(10, 20);
    let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    for _ in 0..20 {
        assert_eq!(limiter.check_request(ip), RateLimitResult::Allowed);
    }
    assert_eq!(limiter.check_request(ip), RateLimitResult::IpLimitExceeded);
}

#[test]
fn test_rate_limiter_tracks_ips_independently() {
    let limiter = ApiRateLimiter::new(10, 1);
    let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    assert_eq!(limiter.check_request(a), RateLimitResult::Allowed);
    assert_eq!(limiter.check_request(a), RateLimitResult::IpLimitExceeded);
    assert_eq!(limiter.check_request(b), RateLimitResult::Allowed);
}

#[test]
fn test_authenticator_without_token_is_open() {
    let auth = ApiAuthenticator::new(None);
    assert!(!auth.is_enabled());
    assert_eq!(auth.authenticate("/v1/metrics", None), AuthResult::NotRequired);
}

#[test]
fn test_authenticator_with_token() {
    let auth = ApiAuthenticator::new(Some("secret123".to_string()));
    assert!(auth.is_enabled());

    // Health stays reachable for liveness checks.
    assert_eq!(auth.authenticate("/health", None), AuthResult::NotRequired);

    assert_eq!(auth.authenticate("/v1/metrics", None), AuthResult::MissingToken);
    assert_eq!(
        auth.authenticate("/v1/metrics", Some("Token secret123")),
        AuthResult::InvalidFormat
    );
    assert_eq!(
        auth.authenticate("/v1/metrics", Some("Bearer wrong")),
        AuthResult::InvalidToken
    );
    assert_eq!(
        auth.authenticate("/v1/metrics", Some("Bearer secret123")),
        AuthResult::Authenticated
    );
}

#[test]
fn test_header_parsing() {
    let lines = vec![
        "Authorization: Bearer token123\r\n".to_string(),
        "Content-Length: 42\r\n".to_string(),
        "Content-Type: application/json\r\n".to_string(),
        "X-Unknown: ignored\r\n".to_string(),
    ];

    let headers = RequestHeaders::parse(&lines);
    assert_eq!(headers.authorization.as_deref(), Some("Bearer token123"));
    assert_eq!(headers.content_length, Some(42));
    assert_eq!(headers.content_type.as_deref(), Some("application/json"));
}

#[test]
fn test_refresh_limiter_budget() {
    let context = ApiContext::new(None, 100, 200, 2);

    assert!(context.refresh_limiter.check("10.0.0.1"));
    assert!(context.refresh_limiter.check("10.0.0.1"));
    assert!(!context.refresh_limiter.check("10.0.0.1"));
    assert!(context.refresh_limiter.check("10.0.0.2"));
}
