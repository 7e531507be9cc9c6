//! Browser transport identities.
//!
//! An [`IdentityProfile`] is an immutable description of how requests look on
//! the wire: which headers go out and in what order, which HTTP version is
//! negotiated, and which TLS/HTTP2 tuning the transport is built with.

use std::fmt::{Display, Formatter};

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::transport::HttpRequest;

/// Preferred HTTP version for outbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpVersionPreference {
    /// HTTP/1.1 only, with title-case header names on the wire.
    Http1,
    /// Offer h2 via ALPN, falling back to HTTP/1.1 when the server refuses.
    Http2,
}

/// HTTP/2 SETTINGS values a browser announces on connection start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2Settings {
    pub initial_stream_window: u32,
    pub initial_connection_window: u32,
    pub max_frame_size: u32,
}

/// TLS/HTTP2 fingerprint family selected by `tls_profile_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsProfile {
    Chrome131,
    Firefox133,
    Safari18,
}

impl TlsProfile {
    pub const ALL: [Self; 3] = [Self::Chrome131, Self::Firefox133, Self::Safari18];

    pub const fn id(self) -> &'static str {
        match self {
            Self::Chrome131 => "chrome-131",
            Self::Firefox133 => "firefox-133",
            Self::Safari18 => "safari-18",
        }
    }

    pub fn from_id(id: &str) -> Result<Self, ConfigurationError> {
        let normalized = id.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|profile| profile.id() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownTlsProfile { id: id.to_string() })
    }

    pub const fn h2_settings(self) -> H2Settings {
        match self {
            Self::Chrome131 => H2Settings {
                initial_stream_window: 6_291_456,
                initial_connection_window: 15_728_640,
                max_frame_size: 16_384,
            },
            Self::Firefox133 => H2Settings {
                initial_stream_window: 131_072,
                initial_connection_window: 12_517_377,
                max_frame_size: 16_384,
            },
            Self::Safari18 => H2Settings {
                initial_stream_window: 4_194_304,
                initial_connection_window: 10_551_295,
                max_frame_size: 16_384,
            },
        }
    }
}

impl Display for TlsProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Immutable browser identity shared by every request of one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    name: String,
    default_headers: Vec<(String, String)>,
    tls_profile: TlsProfile,
    http_version_preference: HttpVersionPreference,
}

impl IdentityProfile {
    /// Builds a profile, rejecting anything that could not be sent on the wire.
    pub fn new<N, V>(
        name: impl Into<String>,
        default_headers: impl IntoIterator<Item = (N, V)>,
        tls_profile_id: &str,
        http_version_preference: HttpVersionPreference,
    ) -> Result<Self, ConfigurationError>
    where
        N: Into<String>,
        V: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyProfileName);
        }

        let mut headers: Vec<(String, String)> = Vec::new();
        for (header_name, header_value) in default_headers {
            let header_name = header_name.into();
            let header_value = header_value.into();
            validate_header(&header_name, &header_value)?;
            if headers
                .iter()
                .any(|(existing, _)| existing.eq_ignore_ascii_case(&header_name))
            {
                return Err(ConfigurationError::DuplicateHeader { name: header_name });
            }
            headers.push((header_name, header_value));
        }

        Ok(Self {
            name,
            default_headers: headers,
            tls_profile: TlsProfile::from_id(tls_profile_id)?,
            http_version_preference,
        })
    }

    /// Desktop Chrome 131 on Windows, navigation request shape.
    pub fn chrome() -> Self {
        Self::preset(
            "Chrome-131-like",
            TlsProfile::Chrome131,
            &[
                ("sec-ch-ua", "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
                ("sec-ch-ua-mobile", "?0"),
                ("sec-ch-ua-platform", "\"Windows\""),
                ("Upgrade-Insecure-Requests", "1"),
                (
                    "User-Agent",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                ),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
                ),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-User", "?1"),
                ("Sec-Fetch-Dest", "document"),
                ("Accept-Encoding", "gzip, deflate, br"),
                ("Accept-Language", "en-US,en;q=0.9"),
            ],
        )
    }

    /// Desktop Firefox 133 on Windows.
    pub fn firefox() -> Self {
        Self::preset(
            "Firefox-133-like",
            TlsProfile::Firefox133,
            &[
                (
                    "User-Agent",
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
                ),
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
                ("Accept-Encoding", "gzip, deflate, br"),
                ("Upgrade-Insecure-Requests", "1"),
                ("Sec-Fetch-Dest", "document"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-User", "?1"),
                ("Priority", "u=0, i"),
            ],
        )
    }

    /// Safari 18 on macOS.
    pub fn safari() -> Self {
        Self::preset(
            "Safari-18-like",
            TlsProfile::Safari18,
            &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-Mode", "navigate"),
                (
                    "User-Agent",
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
                ),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("Sec-Fetch-Dest", "document"),
                ("Accept-Encoding", "gzip, deflate, br"),
            ],
        )
    }

    fn preset(name: &str, tls_profile: TlsProfile, headers: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            default_headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            tls_profile,
            http_version_preference: HttpVersionPreference::Http2,
        }
    }

    /// Same identity, negotiated over a different HTTP version.
    pub fn with_http_version(mut self, preference: HttpVersionPreference) -> Self {
        self.http_version_preference = preference;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_headers(&self) -> &[(String, String)] {
        &self.default_headers
    }

    pub const fn tls_profile(&self) -> TlsProfile {
        self.tls_profile
    }

    pub const fn http_version_preference(&self) -> HttpVersionPreference {
        self.http_version_preference
    }

    /// Stamps the profile onto an outbound request.
    ///
    /// Defaults go out first, in profile order. A caller header whose name
    /// matches a default replaces that default's value in place (the last
    /// caller value wins); all other caller headers follow in caller order.
    pub fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        let caller = std::mem::take(&mut request.headers);
        let mut consumed = vec![false; caller.len()];
        let mut merged = Vec::with_capacity(self.default_headers.len() + caller.len());

        for (name, default_value) in &self.default_headers {
            let mut value = default_value;
            for (index, (caller_name, caller_value)) in caller.iter().enumerate() {
                if caller_name.eq_ignore_ascii_case(name) {
                    consumed[index] = true;
                    value = caller_value;
                }
            }
            merged.push((name.clone(), value.clone()));
        }

        merged.extend(
            caller
                .into_iter()
                .zip(consumed)
                .filter(|(_, consumed)| !consumed)
                .map(|(header, _)| header),
        );

        request.headers = merged;
        request.tls_profile = self.tls_profile;
        request.http_version = self.http_version_preference;
        request
    }
}

impl Default for IdentityProfile {
    fn default() -> Self {
        Self::chrome()
    }
}

pub(crate) fn validate_header(name: &str, value: &str) -> Result<(), ConfigurationError> {
    if HeaderName::from_bytes(name.as_bytes()).is_err() {
        return Err(ConfigurationError::InvalidHeaderName {
            name: name.to_string(),
        });
    }
    if HeaderValue::from_str(value).is_err() {
        return Err(ConfigurationError::InvalidHeaderValue {
            name: name.to_string(),
        });
    }
    Ok(())
}
