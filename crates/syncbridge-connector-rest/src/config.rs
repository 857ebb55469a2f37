//! REST record-store configuration
//!
//! # Security
//!
//! Base URLs are checked against private, loopback and metadata addresses
//! before any request is made. `allow_localhost` lifts the check for local
//! development and tests only.

use base64::Engine;
use reqwest::{header, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use syncbridge_connector::config::{ConnectorConfig, Secret, Timeouts};
use syncbridge_connector::error::{ConnectorError, ConnectorResult};
use syncbridge_connector::types::ConnectorType;

use crate::retry::RetryConfig;

/// Largest page the record store serves.
pub const MAX_PAGE_SIZE: usize = 100;

/// Reject URLs that target internal services.
///
/// Blocks private IPv4 ranges, loopback, link-local, shared address space
/// and well-known metadata hostnames. Hostnames are resolved and every
/// address is checked.
fn validate_url_ssrf(url: &url::Url) -> Result<(), String> {
    let scheme = url.scheme();
    if scheme != "https" && scheme != "http" {
        return Err(format!("unsupported scheme: {scheme}"));
    }

    let host = url.host_str().ok_or_else(|| "URL has no host".to_string())?;
    let bare_host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = bare_host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(format!("private/internal IP addresses are not allowed: {ip}"));
        }
    } else {
        let port = url.port_or_known_default().unwrap_or(443);
        if let Ok(addrs) = (bare_host, port).to_socket_addrs() {
            for addr in addrs {
                if is_private_ip(&addr.ip()) {
                    return Err(format!(
                        "hostname {host} resolves to private/internal IP: {}",
                        addr.ip()
                    ));
                }
            }
        }
    }

    let lower_host = bare_host.to_lowercase();
    let blocked_hosts = [
        "localhost",
        "127.0.0.1",
        "::1",
        "0.0.0.0",
        "metadata",
        "metadata.google.internal",
        "169.254.169.254",
    ];
    for blocked in blocked_hosts {
        if lower_host == blocked || lower_host.ends_with(&format!(".{blocked}")) {
            return Err(format!("blocked internal hostname: {host}"));
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        || {
            // 100.64.0.0/10
            let octets = ip.octets();
            octets[0] == 100 && (64..=127).contains(&octets[1])
        }
}

fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(&ipv4);
    }
    let segments = ip.segments();
    // fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10
    (segments[0] & 0xffc0) == 0xfe80
}

/// How requests prove their identity to the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestAuth {
    #[default]
    None,

    /// Personal access token sent as `Authorization: Bearer`.
    Bearer { token: Secret },

    /// Key sent in a custom header.
    ApiKey {
        key: Secret,
        #[serde(default = "default_key_header")]
        header: String,
    },

    Basic { username: String, password: Secret },
}

fn default_key_header() -> String {
    "X-API-Key".to_string()
}

impl RestAuth {
    pub fn bearer(token: impl Into<Secret>) -> Self {
        RestAuth::Bearer {
            token: token.into(),
        }
    }

    pub fn api_key(key: impl Into<Secret>) -> Self {
        RestAuth::ApiKey {
            key: key.into(),
            header: default_key_header(),
        }
    }

    /// Attach the credential to a request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            RestAuth::None => request,
            RestAuth::Bearer { token } => request.bearer_auth(token.expose()),
            RestAuth::ApiKey { key, header } => request.header(header.as_str(), key.expose()),
            RestAuth::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{}", password.expose()));
                request.header(header::AUTHORIZATION, format!("Basic {encoded}"))
            }
        }
    }

    #[must_use]
    pub fn redacted(&self) -> Self {
        match self {
            RestAuth::None => RestAuth::None,
            RestAuth::Bearer { .. } => RestAuth::Bearer {
                token: Secret::masked(),
            },
            RestAuth::ApiKey { header, .. } => RestAuth::ApiKey {
                key: Secret::masked(),
                header: header.clone(),
            },
            RestAuth::Basic { username, .. } => RestAuth::Basic {
                username: username.clone(),
                password: Secret::masked(),
            },
        }
    }
}

/// Connection settings for a hosted record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestConfig {
    /// API root, e.g. `https://api.records.example.com/v1`.
    pub base_url: String,

    #[serde(default)]
    pub auth: RestAuth,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Headers sent with every request.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Records requested per page, capped at [`MAX_PAGE_SIZE`].
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records accepted by one create request.
    #[serde(default = "default_write_batch_limit")]
    pub write_batch_limit: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Skip SSRF checks (local development and tests only).
    #[serde(default)]
    pub allow_localhost: bool,
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_write_batch_limit() -> usize {
    10
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: RestAuth::None,
            timeouts: Timeouts::default(),
            default_headers: HashMap::new(),
            page_size: default_page_size(),
            write_batch_limit: default_write_batch_limit(),
            retry: RetryConfig::default(),
            allow_localhost: false,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: RestAuth) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_bearer_token(self, token: impl Into<Secret>) -> Self {
        self.with_auth(RestAuth::bearer(token))
    }

    #[must_use]
    pub fn with_api_key(self, key: impl Into<Secret>) -> Self {
        self.with_auth(RestAuth::api_key(key))
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    #[must_use]
    pub fn with_write_batch_limit(mut self, limit: usize) -> Self {
        self.write_batch_limit = limit;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = RetryConfig::disabled();
        self
    }

    /// Allow loopback and private addresses.
    ///
    /// Never enable this for production connections.
    #[must_use]
    pub fn with_allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Append path segments to the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> ConnectorResult<url::Url> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| ConnectorError::invalid_config(format!("invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ConnectorError::invalid_config("base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Page size actually requested from the store.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

impl ConnectorConfig for RestConfig {
    fn connector_type() -> ConnectorType {
        ConnectorType::Rest
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::invalid_config("base_url is required"));
        }

        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ConnectorError::invalid_config(format!("invalid base_url: {e}")))?;

        if !self.allow_localhost {
            validate_url_ssrf(&url).map_err(|e| {
                ConnectorError::invalid_config(format!("SSRF protection: {e}"))
            })?;
        }

        if self.write_batch_limit == 0 {
            return Err(ConnectorError::invalid_config(
                "write_batch_limit must be at least 1",
            ));
        }
        self.timeouts.validate()?;

        Ok(())
    }

    fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.auth = config.auth.redacted();
        config
    }
}
