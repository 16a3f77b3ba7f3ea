//! CLI configuration.
//!
//! Values come from an optional config file and `GITWIRE_*` environment
//! variables (`GITWIRE_PROXY__URL` sets `proxy.url`), environment winning.

use gitwire_protocol::{Capability, CapabilityList, DEFAULT_AGENT};
use gitwire_transport::{filter_unsupported_capabilities, Endpoint, ProxyOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the gitwire client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Agent string sent to servers.
    pub user_agent: String,
    /// HTTP proxy.
    pub proxy: Option<ProxyOptions>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls: bool,
    /// Extra CA bundle.
    pub ca_bundle: Option<PathBuf>,
    /// Request side-band multiplexing when the server offers it.
    pub side_band: bool,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_AGENT.to_string(),
            proxy: None,
            insecure_skip_tls: false,
            ca_bundle: None,
            side_band: true,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Loads the configuration. A given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder
            .add_source(
                ::config::Environment::with_prefix("GITWIRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Sets the proxy and TLS fields of a parsed endpoint.
    pub fn apply(&self, endpoint: &mut Endpoint) {
        if let Some(proxy) = &self.proxy {
            endpoint.proxy = proxy.clone();
        }
        endpoint.insecure_skip_tls = self.insecure_skip_tls;
        if self.ca_bundle.is_some() {
            endpoint.ca_bundle.clone_from(&self.ca_bundle);
        }
    }

    /// Picks the capabilities to request from what the server advertised.
    pub fn request_capabilities(&self, advertised: &CapabilityList) -> CapabilityList {
        let mut wanted = vec![Capability::OfsDelta];
        if self.side_band {
            if advertised.supports(&Capability::SideBand64k) {
                wanted.push(Capability::SideBand64k);
            } else {
                wanted.push(Capability::SideBand);
            }
        }

        let mut caps = CapabilityList::new();
        for cap in wanted.into_iter().filter(|c| advertised.supports(c)) {
            caps.add(cap, None);
        }
        caps.add(Capability::Agent, Some(&self.user_agent));
        filter_unsupported_capabilities(&mut caps);
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.user_agent.starts_with("gitwire/"));
        assert!(config.side_band);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
user_agent = "test/1.0"
side_band = false
connect_timeout_secs = 3

[proxy]
url = "http://proxy.local:3128"
username = "user"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.user_agent, "test/1.0");
        assert!(!config.side_band);
        assert_eq!(config.connect_timeout_secs, 3);
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.url, "http://proxy.local:3128");
        assert_eq!(proxy.username, "user");
        assert_eq!(proxy.password, "");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_apply_sets_proxy_and_tls() {
        let config = Config {
            proxy: Some(ProxyOptions {
                url: "http://proxy.local:3128".to_string(),
                ..Default::default()
            }),
            insecure_skip_tls: true,
            ca_bundle: Some(PathBuf::from("/etc/ssl/extra.pem")),
            ..Default::default()
        };
        let mut endpoint = Endpoint::parse("https://example.com/repo.git").unwrap();
        config.apply(&mut endpoint);

        assert_eq!(endpoint.proxy.url, "http://proxy.local:3128");
        assert!(endpoint.insecure_skip_tls);
        assert_eq!(endpoint.ca_bundle, Some(PathBuf::from("/etc/ssl/extra.pem")));
        assert_eq!(endpoint.to_string(), "https://example.com/repo.git");
    }

    #[test]
    fn test_request_capabilities() {
        let advertised =
            CapabilityList::decode(b"multi_ack thin-pack side-band side-band-64k ofs-delta")
                .unwrap();
        let config = Config {
            user_agent: "test/1.0".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.request_capabilities(&advertised).to_string(),
            "ofs-delta side-band-64k agent=test/1.0"
        );

        let plain = Config {
            side_band: false,
            user_agent: "test/1.0".to_string(),
            ..Default::default()
        };
        let bare = CapabilityList::decode(b"side-band").unwrap();
        assert_eq!(plain.request_capabilities(&bare).to_string(), "agent=test/1.0");
    }
}
