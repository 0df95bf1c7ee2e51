//! Net effect handler: outbound HTTP with a hard policy layer.
//!
//! Policy (checked before any connection is made, and re-checked on every
//! redirect hop):
//! - the destination host must be on the allowlist (exact or subdomain)
//! - loopback, private, and link-local destinations are refused
//! - hop-by-hop headers and `Host` overrides are rejected
//! - response bodies are capped (default 5 MB)
//! - redirects are followed only for GET/HEAD, at most 10 hops, and the
//!   final host must still be allowlisted
//!
//! Policy violations abort with `CAP_POLICY`; transport failures are
//! ordinary language-level `Err` strings. Error text never includes header
//! values, so credentials cannot leak through diagnostics.

use std::io::Read;
use std::net::IpAddr;

use ailang_common::{Code, Diagnostic};

use crate::effects::{EffContext, NetPolicy};

/// Headers that manage the connection rather than the request; letting a
/// program set these would smuggle transport control past the policy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
    "host",
];

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// The scheme/host/port split of a validated URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub host: String,
    pub authority: String,
}

fn policy_err(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(Code::CapPolicy, message.into())
}

/// Parse and structurally validate a URL. Userinfo (`user:pass@host`) is
/// rejected outright: it is a credential-leak and host-confusion vector.
pub fn parse_url(url: &str) -> Result<UrlParts, Diagnostic> {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("https://") {
        ("https", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        ("http", rest)
    } else {
        return Err(policy_err("only http and https URLs are allowed"));
    };
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.is_empty() {
        return Err(policy_err("URL has no host"));
    }
    if authority.contains('@') {
        return Err(policy_err("URLs with userinfo are not allowed"));
    }
    let host = authority
        .rsplit_once(':')
        .map(|(h, _)| h)
        .unwrap_or(authority);
    Ok(UrlParts {
        scheme: scheme.to_string(),
        host: host.to_ascii_lowercase(),
        authority: authority.to_string(),
    })
}

/// Exact allowlist match, or a subdomain of an allowed host.
pub fn host_allowed(policy: &NetPolicy, host: &str) -> bool {
    policy.allow.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    })
}

/// Loopback, private-range, link-local, and unspecified destinations are
/// never reachable, allowlisted or not.
pub fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback()
                || ip.is_private()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
        }
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                // Unique-local fc00::/7 and link-local fe80::/10.
                || (ip.segments()[0] & 0xfe00) == 0xfc00
                || (ip.segments()[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

/// Full request-shape validation: method, URL, headers. Pure, so the
/// policy is testable without a network.
pub fn validate_request(
    policy: &NetPolicy,
    method: &str,
    url: &str,
    headers: &[(String, String)],
) -> Result<UrlParts, Diagnostic> {
    match method {
        "GET" | "HEAD" | "POST" | "PUT" | "DELETE" | "PATCH" => {}
        other => return Err(policy_err(format!("unsupported HTTP method `{}`", other))),
    }
    for (name, _) in headers {
        if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
            return Err(policy_err(format!(
                "header `{}` is hop-by-hop and cannot be set",
                name
            )));
        }
    }
    let parts = parse_url(url)?;
    if is_private_host(&parts.host) {
        return Err(policy_err(format!(
            "destination `{}` is local or private",
            parts.host
        )));
    }
    if !host_allowed(policy, &parts.host) {
        return Err(policy_err(format!(
            "host `{}` is not on the allowlist",
            parts.host
        ))
        .with_hint("pass --net-allow with the domains this program may contact"));
    }
    Ok(parts)
}

/// Perform an HTTP request under the context's policy.
///
/// The outer `Result` is for capability/policy failures; the inner one is
/// the language-level `Result[HttpResponse, String]`.
pub fn http_request(
    ctx: &EffContext,
    method: &str,
    url: &str,
    headers: &[(String, String)],
    body: &str,
) -> Result<Result<HttpResponse, String>, Diagnostic> {
    ctx.require("Net")?;
    let policy = &ctx.env.net;
    let method = method.to_ascii_uppercase();

    let agent = ureq::AgentBuilder::new()
        .redirects(0)
        .timeout(policy.timeout)
        .build();

    let mut current_url = url.to_string();
    for _hop in 0..=MAX_REDIRECTS {
        let parts = validate_request(policy, &method, &current_url, headers)?;

        let mut request = agent.request(&method, &current_url);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let outcome = if body.is_empty() || method == "GET" || method == "HEAD" {
            request.call()
        } else {
            request.send_string(body)
        };
        let response = match outcome {
            Ok(response) => response,
            // 4xx/5xx carry a response; the program sees the status.
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(t)) => {
                // Host only; never the URL's query or any header value.
                return Ok(Err(format!(
                    "request to {} failed: {}",
                    parts.host,
                    t.kind()
                )));
            }
        };

        let status = response.status();
        if matches!(status, 301 | 302 | 303 | 307 | 308) && (method == "GET" || method == "HEAD") {
            let Some(location) = response.header("location").map(str::to_string) else {
                return Ok(Err(format!("redirect from {} without Location", parts.host)));
            };
            current_url = if location.starts_with("http://") || location.starts_with("https://") {
                location
            } else if let Some(path) = location.strip_prefix('/') {
                format!("{}://{}/{}", parts.scheme, parts.authority, path)
            } else {
                return Ok(Err("unsupported relative redirect".to_string()));
            };
            continue;
        }

        let text = read_capped(response, policy.max_bytes)?;
        return Ok(Ok(HttpResponse { status, body: text }));
    }

    Err(policy_err(format!(
        "more than {} redirect hops",
        MAX_REDIRECTS
    )))
}

fn read_capped(response: ureq::Response, max_bytes: usize) -> Result<String, Diagnostic> {
    let mut buf = Vec::new();
    let mut reader = response.into_reader().take(max_bytes as u64 + 1);
    reader
        .read_to_end(&mut buf)
        .map_err(|e| policy_err(format!("read failed: {}", e)))?;
    if buf.len() > max_bytes {
        return Err(policy_err(format!(
            "response exceeds the {} byte cap",
            max_bytes
        )));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// Network-touching paths are exercised end to end by hand; everything
// below tests the pure policy layer.
#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allow: &[&str]) -> NetPolicy {
        NetPolicy {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            ..NetPolicy::default()
        }
    }

    #[test]
    fn parse_url_splits_scheme_host_port() {
        let parts = parse_url("https://api.example.com:8443/v1/data?q=1").unwrap();
        assert_eq!(parts.scheme, "https");
        assert_eq!(parts.host, "api.example.com");
        assert_eq!(parts.authority, "api.example.com:8443");
    }

    #[test]
    fn parse_url_rejects_userinfo_and_bad_schemes() {
        assert!(parse_url("https://user:pw@example.com/").is_err());
        assert!(parse_url("ftp://example.com/").is_err());
        assert!(parse_url("example.com").is_err());
    }

    #[test]
    fn allowlist_matches_exact_and_subdomains() {
        let p = policy(&["example.com"]);
        assert!(host_allowed(&p, "example.com"));
        assert!(host_allowed(&p, "api.example.com"));
        assert!(!host_allowed(&p, "notexample.com"));
        assert!(!host_allowed(&p, "example.com.evil.net"));
    }

    #[test]
    fn private_destinations_are_refused() {
        assert!(is_private_host("localhost"));
        assert!(is_private_host("127.0.0.1"));
        assert!(is_private_host("10.0.0.7"));
        assert!(is_private_host("192.168.1.1"));
        assert!(is_private_host("169.254.1.1"));
        assert!(is_private_host("0.0.0.0"));
        assert!(is_private_host("::1"));
        assert!(is_private_host("fe80::1"));
        assert!(is_private_host("fc00::1"));
        assert!(!is_private_host("93.184.216.34"));
        assert!(!is_private_host("example.com"));
    }

    #[test]
    fn private_ip_is_refused_even_when_allowlisted() {
        let p = policy(&["127.0.0.1"]);
        let err = validate_request(&p, "GET", "http://127.0.0.1/x", &[]).unwrap_err();
        assert_eq!(err.code, Code::CapPolicy);
        assert!(err.message.contains("local or private"));
    }

    #[test]
    fn hop_by_hop_headers_are_rejected() {
        let p = policy(&["example.com"]);
        for name in ["Connection", "Transfer-Encoding", "Host", "keep-alive"] {
            let headers = vec![(name.to_string(), "x".to_string())];
            let err =
                validate_request(&p, "GET", "https://example.com/", &headers).unwrap_err();
            assert_eq!(err.code, Code::CapPolicy, "header {}", name);
        }
    }

    #[test]
    fn ordinary_headers_pass_validation() {
        let p = policy(&["example.com"]);
        let headers = vec![
            ("Authorization".to_string(), "Bearer tok".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        assert!(validate_request(&p, "POST", "https://example.com/v1", &headers).is_ok());
    }

    #[test]
    fn off_allowlist_host_carries_a_hint() {
        let p = policy(&["example.com"]);
        let err = validate_request(&p, "GET", "https://other.org/", &[]).unwrap_err();
        assert!(err.hint.unwrap().contains("--net-allow"));
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let p = policy(&["example.com"]);
        assert!(validate_request(&p, "TRACE", "https://example.com/", &[]).is_err());
    }
}
