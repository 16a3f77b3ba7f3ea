//! Repository addresses.
//!
//! Git accepts three address grammars: explicit URLs (`https://host/repo`),
//! SCP-like shorthand (`git@host:repo`) and plain filesystem paths. All of
//! them parse into one [`Endpoint`], which always serializes back as a URL.

use crate::error::EndpointError;
use once_cell::sync::Lazy;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Result type for address parsing.
pub type Result<T> = std::result::Result<T, EndpointError>;

/// Matches anything that carries an explicit scheme.
static SCHEME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^:]+://").expect("Invalid regex"));

/// Matches `[user@]host:[port(/|:)]path`.
static SCP_LIKE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?P<user>[^@/]+)@)?(?P<host>[^:/\s]+):(?:(?P<port>[0-9]{1,5})[/:])?(?P<path>[^\\].*)$",
    )
    .expect("Invalid regex")
});

/// Matches a drive-letter path such as `C:\repo` or `C:/repo`.
static WINDOWS_PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]:[\\/]").expect("Invalid regex"));

/// Bytes left alone when escaping a password, matching a URL path segment.
const PASSWORD_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Transport protocol named by an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Smart HTTP.
    Http,
    /// Smart HTTP over TLS.
    Https,
    /// SSH, running the service as a remote command.
    Ssh,
    /// The git daemon protocol.
    Git,
    /// A local repository, running the service as a child process.
    File,
}

impl Protocol {
    /// All supported protocols.
    pub const ALL: [Protocol; 5] = [
        Protocol::Http,
        Protocol::Https,
        Protocol::Ssh,
        Protocol::Git,
        Protocol::File,
    ];

    /// Returns the URL scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ssh => "ssh",
            Self::Git => "git",
            Self::File => "file",
        }
    }

    /// Returns the well-known port, if the protocol has one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Http => Some(80),
            Self::Https => Some(443),
            Self::Ssh => Some(22),
            Self::Git => Some(9418),
            Self::File => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EndpointError::UnsupportedProtocol(s.to_string()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP proxy settings for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Proxy URL, e.g. `http://proxy.local:3128`.
    pub url: String,
    /// Proxy user.
    pub username: String,
    /// Proxy password.
    pub password: String,
}

impl ProxyOptions {
    /// Returns true if no proxy is configured.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }

    /// Checks that the proxy URL parses.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        Url::parse(&self.url)
            .map(|_| ())
            .map_err(|_| EndpointError::InvalidProxy(self.url.clone()))
    }

    /// Returns the proxy URL with credentials embedded.
    pub fn full_url(&self) -> Result<Url> {
        let mut url =
            Url::parse(&self.url).map_err(|_| EndpointError::InvalidProxy(self.url.clone()))?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| EndpointError::InvalidProxy(self.url.clone()))?;
            if !self.password.is_empty() {
                url.set_password(Some(&self.password))
                    .map_err(|_| EndpointError::InvalidProxy(self.url.clone()))?;
            }
        }
        Ok(url)
    }
}

/// A parsed repository address.
///
/// Only the proxy and TLS fields are meant to change after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Transport protocol.
    pub protocol: Protocol,
    /// User, as given (percent-decoded for URLs).
    pub user: String,
    /// Password, as given (percent-decoded for URLs).
    pub password: String,
    /// Host; IPv6 literals keep their brackets.
    pub host: String,
    /// Port, or 0 for the protocol default.
    pub port: u16,
    /// Repository path. Absolute for `file` endpoints parsed from a path.
    pub path: String,
    /// Proxy to use for HTTP transports.
    pub proxy: ProxyOptions,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls: bool,
    /// Extra CA bundle to trust.
    pub ca_bundle: Option<PathBuf>,
}

impl Endpoint {
    fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            path: String::new(),
            proxy: ProxyOptions::default(),
            insecure_skip_tls: false,
            ca_bundle: None,
        }
    }

    /// Parses any address git accepts.
    pub fn parse(address: &str) -> Result<Self> {
        if SCHEME_REGEX.is_match(address) {
            return Self::parse_url(address);
        }
        if let Some(endpoint) = Self::parse_scp_like(address)? {
            return Ok(endpoint);
        }
        Self::parse_file(address)
    }

    /// Returns the port to connect to, falling back to the protocol default.
    pub fn effective_port(&self) -> Option<u16> {
        match self.port {
            0 => self.protocol.default_port(),
            port => Some(port),
        }
    }

    /// Returns `host` or `host:port` when a non-default port is set.
    pub fn host_with_port(&self) -> String {
        if self.port == 0 || Some(self.port) == self.protocol.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn parse_url(address: &str) -> Result<Self> {
        let (scheme, rest) = address.split_once("://").unwrap_or((address, ""));
        let protocol = scheme.to_ascii_lowercase().parse::<Protocol>()?;

        let url = Url::parse(address).map_err(|_| EndpointError::InvalidUrl(address.to_string()))?;

        // The url crate normalizes the path and query, so those are sliced from
        // the raw address; userinfo, host and port come from the parsed URL.
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        let mut endpoint = Self::new(protocol);
        endpoint.user = decode(url.username());
        endpoint.password = url.password().map(decode).unwrap_or_default();
        endpoint.host = raw_host(authority, url.host_str().unwrap_or_default());
        endpoint.port = match url.port() {
            Some(port) if Some(port) != protocol.default_port() => port,
            _ => 0,
        };
        endpoint.path = raw_path(tail);
        Ok(endpoint)
    }

    fn parse_scp_like(address: &str) -> Result<Option<Self>> {
        if WINDOWS_PATH_REGEX.is_match(address) {
            return Ok(None);
        }
        let Some(caps) = SCP_LIKE_REGEX.captures(address) else {
            return Ok(None);
        };

        let mut endpoint = Self::new(Protocol::Ssh);
        endpoint.user = caps.name("user").map_or("", |m| m.as_str()).to_string();
        endpoint.host = caps["host"].to_string();
        endpoint.port = match caps.name("port") {
            Some(port) => port
                .as_str()
                .parse()
                .map_err(|_| EndpointError::InvalidPort(port.as_str().to_string()))?,
            None => 22,
        };
        endpoint.path = caps["path"].to_string();
        Ok(Some(endpoint))
    }

    fn parse_file(address: &str) -> Result<Self> {
        let path = Path::new(address);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(EndpointError::WorkingDir)?
                .join(path)
        };

        let mut endpoint = Self::new(Protocol::File);
        endpoint.path = normalize(&absolute).to_string_lossy().into_owned();
        Ok(endpoint)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.protocol)?;
        if !self.user.is_empty() || !self.password.is_empty() {
            f.write_str(&self.user)?;
            if !self.password.is_empty() {
                write!(f, ":{}", utf8_percent_encode(&self.password, PASSWORD_ESCAPE))?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.host_with_port())?;
        if !self.host.is_empty() && !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Returns the host as written in the authority when it only differs from the
/// parsed host by case.
fn raw_host(authority: &str, parsed: &str) -> String {
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host_port.find(']') {
        Some(end) if host_port.starts_with('[') => &host_port[..=end],
        _ => host_port.rsplit_once(':').map_or(host_port, |(h, _)| h),
    };
    if host.eq_ignore_ascii_case(parsed) {
        host.to_string()
    } else {
        parsed.to_string()
    }
}

/// Builds the repository path from everything after the authority: the path
/// percent-decoded, the query raw and the fragment decoded.
fn raw_path(tail: &str) -> String {
    let (rest, fragment) = tail.split_once('#').unwrap_or((tail, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

    let mut out = decode(path);
    if !query.is_empty() {
        out.push('?');
        out.push_str(query);
    }
    if !fragment.is_empty() {
        out.push('#');
        out.push_str(&decode(fragment));
    }
    out
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
