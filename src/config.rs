//! Configuration loading and validation.
//!
//! The configuration file is YAML by default; files ending in `.toml` are
//! read as TOML. Every section is optional:
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 53
//!   ttl: 500
//! dot:
//!   enabled: false
//!   port: 853
//!   tls: { cert: /etc/hostgate/cert.pem, key: /etc/hostgate/key.pem }
//! hosts:
//!   api.test.com: 10.0.0.1
//!   "*.dev.lan": [10.0.0.2, "fd00::2"]
//!   '^web\d+\.lan$': { a: 10.0.0.3, aaaa: ["fd00::3"] }
//! system_hosts:
//!   disabled: false
//!   file_path: /etc/hosts
//! upstream:
//!   servers: ["114.114.114.114:53"]
//!   timeout: 5s
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::dns::upstream::UpstreamServer;
use crate::error::{ConfigError, Result, ValidationError};
use crate::hosts::is_ipv6;

/// Default system hosts file.
pub const DEFAULT_SYSTEM_HOSTS_FILE: &str = "/etc/hosts";

/// Default upstream used when none is configured.
pub const DEFAULT_UPSTREAM: &str = "114.114.114.114:53";

/// Main configuration for the hostgate DNS server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    /// DNS-over-TLS listener.
    #[serde(default)]
    pub dot: DotSettings,

    /// Custom domain mappings, answered before anything else.
    #[serde(default)]
    pub hosts: HostsConfig,

    #[serde(default)]
    pub system_hosts: SystemHostsSettings,

    #[serde(default)]
    pub upstream: UpstreamSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub log: LogSettings,
}

/// Plain DNS listener settings (UDP and TCP share host and port).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// TTL in seconds for every answer record.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ttl: default_ttl(),
        }
    }
}

impl ServerSettings {
    /// The IP address to bind listeners to.
    pub fn ip(&self) -> std::result::Result<IpAddr, ValidationError> {
        self.host
            .parse()
            .map_err(|_| ValidationError::InvalidHost {
                host: self.host.clone(),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DotSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_dot_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: TlsSettings,
}

impl Default for DotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_dot_port(),
            tls: TlsSettings::default(),
        }
    }
}

/// PEM certificate chain and private key for the DoT listener.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSettings {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemHostsSettings {
    #[serde(default)]
    pub disabled: bool,

    /// Defaults to `/etc/hosts` unless disabled.
    pub file_path: Option<PathBuf>,
}

impl SystemHostsSettings {
    /// The hosts file to load, or `None` when the tier is disabled.
    pub fn path(&self) -> Option<&Path> {
        if self.disabled {
            return None;
        }
        self.file_path.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSettings {
    /// Upstream servers, tried in order. `udp://`, `tcp://` and `tls://`
    /// prefixes are accepted; bare addresses use UDP and default to port 53.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Per-server query timeout, e.g. `"5s"` or `"1500ms"`.
    #[serde(
        default = "default_upstream_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_UPSTREAM.to_string()],
            timeout: default_upstream_timeout(),
        }
    }
}

impl UpstreamSettings {
    /// Parse the configured servers.
    pub fn parsed_servers(&self) -> std::result::Result<Vec<UpstreamServer>, ValidationError> {
        self.servers.iter().map(|s| UpstreamServer::parse(s)).collect()
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(
        default = "default_metrics_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

/// The `hosts` section: pattern keys in file order, each with its value.
#[derive(Debug, Clone, Default)]
pub struct HostsConfig(Vec<(String, HostValue)>);

impl HostsConfig {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, HostValue)> for HostsConfig {
    fn from_iter<I: IntoIterator<Item = (K, HostValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'de> Deserialize<'de> for HostsConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = HostsConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of domain patterns to addresses")
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
                Ok(HostsConfig::default())
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, HostValue>()? {
                    entries.push((key, value));
                }
                Ok(HostsConfig(entries))
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

/// The value of a `hosts` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    /// `"example.com": "1.2.3.4"`
    Single(String),
    /// `"example.com": ["1.2.3.4", "2001:db8::1"]`
    List(Vec<String>),
    /// `"example.com": { a: [...], aaaa: [...] }`
    Typed {
        #[serde(default)]
        a: Option<OneOrMany>,
        #[serde(default)]
        aaaa: Option<OneOrMany>,
    },
    /// Anything else contributes no addresses.
    Other(IgnoredAny),
}

/// A single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn iter(&self) -> impl Iterator<Item = &str> {
        let slice = match self {
            Self::One(s) => std::slice::from_ref(s),
            Self::Many(v) => v.as_slice(),
        };
        slice.iter().map(|s| s.trim())
    }
}

impl HostValue {
    /// Split the value into IPv4 and IPv6 address lists.
    ///
    /// Bare strings and lists are sorted by the presence of a colon. The
    /// `{a, aaaa}` form assigns addresses by field regardless of content.
    pub fn split_addresses(&self) -> (Vec<String>, Vec<String>) {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        let mut sort = |ip: &str| {
            if is_ipv6(ip) {
                v6.push(ip.to_string());
            } else {
                v4.push(ip.to_string());
            }
        };

        match self {
            Self::Single(ip) => sort(ip.trim()),
            Self::List(ips) => ips.iter().for_each(|ip| sort(ip.trim())),
            Self::Typed { a, aaaa } => {
                v4.extend(a.iter().flat_map(OneOrMany::iter).map(str::to_string));
                v6.extend(aaaa.iter().flat_map(OneOrMany::iter).map(str::to_string));
            }
            Self::Other(_) => {}
        }

        (v4, v6)
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ttl: Option<u32>,
    pub dot: bool,
    pub dot_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub upstreams: Vec<String>,
    pub disable_system_hosts: bool,
    pub system_hosts_file: Option<PathBuf>,
}

const fn default_port() -> u16 {
    53
}

const fn default_ttl() -> u32 {
    500
}

const fn default_dot_port() -> u16 {
    853
}

const fn default_upstream_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9153))
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a duration such as `5s`, `1500ms`, `2m` or `1h30m`.
///
/// An empty string yields the default upstream timeout.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, ValidationError> {
    let invalid = || ValidationError::InvalidTimeout {
        value: value.to_string(),
    };

    let s = value.trim();
    if s.is_empty() {
        return Ok(default_upstream_timeout());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(digits);
        let number: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let seconds = match unit {
            "ns" => number / 1e9,
            "us" | "µs" => number / 1e6,
            "ms" => number / 1e3,
            "s" => number,
            "m" => number * 60.0,
            "h" => number * 3600.0,
            _ => return Err(invalid()),
        };
        let part = Duration::try_from_secs_f64(seconds).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = tail;
    }

    Ok(total)
}

impl Config {
    /// Load configuration from a YAML (or `.toml`) file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::parse_toml(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    /// Parse configuration from a YAML string.
    pub fn parse_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(ConfigError::Parse)?
        };
        config.finish()
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::ParseToml)?;
        config.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_defaults();
        self.validate()?;
        Ok(self)
    }

    /// Replace zero and empty values with their defaults.
    fn apply_defaults(&mut self) {
        if self.server.host.trim().is_empty() {
            self.server.host = default_host();
        }
        if self.server.port == 0 {
            self.server.port = default_port();
        }
        if self.server.ttl == 0 {
            self.server.ttl = default_ttl();
        }
        if self.dot.port == 0 {
            self.dot.port = default_dot_port();
        }
        if self.upstream.timeout.is_zero() {
            self.upstream.timeout = default_upstream_timeout();
        }
        if self.upstream.servers.is_empty() {
            self.upstream.servers = vec![DEFAULT_UPSTREAM.to_string()];
        }
        if self.dot.tls.cert.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            self.dot.tls.cert = None;
        }
        if self.dot.tls.key.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            self.dot.tls.key = None;
        }
        if self
            .system_hosts
            .file_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.system_hosts.file_path = None;
        }
        if !self.system_hosts.disabled && self.system_hosts.file_path.is_none() {
            self.system_hosts.file_path = Some(PathBuf::from(DEFAULT_SYSTEM_HOSTS_FILE));
        }
    }

    /// Apply command-line values on top of the file configuration.
    pub fn apply_overrides(&mut self, overrides: ServerOverrides) -> Result<()> {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(ttl) = overrides.ttl {
            self.server.ttl = ttl;
        }
        self.dot.enabled |= overrides.dot;
        if let Some(port) = overrides.dot_port {
            self.dot.port = port;
        }
        if overrides.tls_cert.is_some() {
            self.dot.tls.cert = overrides.tls_cert;
        }
        if overrides.tls_key.is_some() {
            self.dot.tls.key = overrides.tls_key;
        }
        if !overrides.upstreams.is_empty() {
            self.upstream.servers = overrides.upstreams;
        }
        self.system_hosts.disabled |= overrides.disable_system_hosts;
        if overrides.system_hosts_file.is_some() {
            self.system_hosts.file_path = overrides.system_hosts_file;
        }

        self.apply_defaults();
        self.validate()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.server.ip().map_err(ConfigError::Validation)?;

        if self.server.ttl == 0 {
            return Err(ConfigError::Validation(ValidationError::ZeroTtl).into());
        }

        if self.upstream.servers.is_empty() {
            return Err(ConfigError::Validation(ValidationError::EmptyUpstreams).into());
        }
        self.upstream
            .parsed_servers()
            .map_err(ConfigError::Validation)?;

        if self.dot.enabled && (self.dot.tls.cert.is_none() || self.dot.tls.key.is_none()) {
            return Err(ConfigError::Validation(ValidationError::MissingTlsMaterial).into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn hosts(config: &Config) -> Vec<(&str, (Vec<String>, Vec<String>))> {
        config
            .hosts
            .iter()
            .map(|(k, v)| (k, v.split_addresses()))
            .collect()
    }

    #[test]
    fn test_default_values() {
        let config = Config::parse_yaml("").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 53);
        assert_eq!(config.server.ttl, 500);
        assert_eq!(config.dot.port, 853);
        assert!(!config.dot.enabled);
        assert_eq!(config.upstream.timeout, Duration::from_secs(5));
        assert_eq!(config.upstream.servers, vec!["114.114.114.114:53"]);
        assert_eq!(config.system_hosts.path(), Some(Path::new("/etc/hosts")));
        assert!(config.hosts.is_empty());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let yaml = r#"
server:
  host: ""
  port: 0
  ttl: 0
dot:
  port: 0
upstream:
  servers: []
"#;
        let config = Config::parse_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 53);
        assert_eq!(config.server.ttl, 500);
        assert_eq!(config.dot.port, 853);
        assert_eq!(config.upstream.servers, vec!["114.114.114.114:53"]);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 5353
  ttl: 60
dot:
  enabled: true
  port: 8853
  tls:
    cert: /tmp/cert.pem
    key: /tmp/key.pem
system_hosts:
  file_path: /tmp/hosts
upstream:
  servers: ["1.1.1.1", "tcp://8.8.8.8:53"]
  timeout: 1500ms
metrics:
  enabled: true
  listen: 127.0.0.1:9100
log:
  level: debug
"#;
        let config = Config::parse_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 5353);
        assert_eq!(config.server.ttl, 60);
        assert!(config.dot.enabled);
        assert_eq!(config.dot.port, 8853);
        assert_eq!(config.dot.tls.cert.as_deref(), Some(Path::new("/tmp/cert.pem")));
        assert_eq!(config.system_hosts.path(), Some(Path::new("/tmp/hosts")));
        assert_eq!(config.upstream.timeout, Duration::from_millis(1500));
        assert_eq!(config.upstream.parsed_servers().unwrap().len(), 2);
        assert_eq!(config.metrics.listen.to_string(), "127.0.0.1:9100");
        assert_eq!(config.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_hosts_value_shapes() {
        let yaml = r#"
hosts:
  api.test.com: 10.0.0.1
  multi.test.com: ["10.0.0.2", "2001:db8::2", " 10.0.0.3 "]
  typed.test.com:
    a: ["10.0.0.4"]
    aaaa: "2001:db8::4"
  forced.test.com:
    a: "fe80::9"
  weird.test.com: 42
"#;
        let config = Config::parse_yaml(yaml).unwrap();
        let parsed = hosts(&config);

        assert_eq!(parsed[0].0, "api.test.com");
        assert_eq!(parsed[0].1, (vec!["10.0.0.1".into()], vec![]));
        assert_eq!(
            parsed[1].1,
            (
                vec!["10.0.0.2".into(), "10.0.0.3".into()],
                vec!["2001:db8::2".into()]
            )
        );
        assert_eq!(
            parsed[2].1,
            (vec!["10.0.0.4".into()], vec!["2001:db8::4".into()])
        );
        // Structured form trusts the field, not the content.
        assert_eq!(parsed[3].1, (vec!["fe80::9".into()], vec![]));
        assert_eq!(parsed[4].1, (vec![], vec![]));
        assert!(matches!(
            config.hosts.iter().nth(4).unwrap().1,
            HostValue::Other(_)
        ));
    }

    #[test]
    fn test_hosts_keep_file_order() {
        let yaml = r#"
hosts:
  zeta.lan: 10.0.0.1
  "*.lan": 10.0.0.2
  alpha.lan: 10.0.0.3
"#;
        let config = Config::parse_yaml(yaml).unwrap();
        let keys: Vec<_> = config.hosts.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta.lan", "*.lan", "alpha.lan"]);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[server]
port = 5300

[hosts]
"api.test.com" = "10.0.0.1"
"*.test.com" = { a = ["10.0.0.2"] }

[upstream]
servers = ["9.9.9.9:53"]
timeout = "2s"
"#;
        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(config.server.port, 5300);
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.upstream.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "unknown_field: value\n";
        assert!(Config::parse_yaml(yaml).is_err());
    }

    #[test]
    fn test_dot_without_tls_rejected() {
        let yaml = "dot:\n  enabled: true\n";
        let err = Config::parse_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::Validation(ValidationError::MissingTlsMaterial))
        ));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let yaml = "upstream:\n  timeout: soon\n";
        assert!(Config::parse_yaml(yaml).is_err());
    }

    #[test]
    fn test_unsupported_upstream_scheme_rejected() {
        let yaml = "upstream:\n  servers: [\"https://dns.example/dns-query\"]\n";
        let err = Config::parse_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::Validation(
                ValidationError::UnsupportedUpstreamScheme { .. }
            ))
        ));
    }

    #[test]
    fn test_tls_upstream_accepted() {
        let config = Config::parse_yaml("upstream:\n  servers: [\"tls://1.1.1.1\"]\n").unwrap();

        let servers = config.upstream.parsed_servers().unwrap();
        assert_eq!(servers[0].to_string(), "tls://1.1.1.1:853");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let yaml = "server:\n  host: not-an-ip\n";
        assert!(Config::parse_yaml(yaml).is_err());
    }

    #[test]
    fn test_disabled_system_hosts_has_no_path() {
        let yaml = "system_hosts:\n  disabled: true\n";
        let config = Config::parse_yaml(yaml).unwrap();
        assert!(config.system_hosts.path().is_none());
        assert!(config.system_hosts.file_path.is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let yaml = r#"
server:
  port: 5353
upstream:
  servers: ["1.1.1.1:53"]
"#;
        let mut config = Config::parse_yaml(yaml).unwrap();
        config
            .apply_overrides(ServerOverrides {
                port: Some(1053),
                upstreams: vec!["9.9.9.9".into()],
                disable_system_hosts: true,
                ..ServerOverrides::default()
            })
            .unwrap();

        assert_eq!(config.server.port, 1053);
        assert_eq!(config.server.ttl, 500);
        assert_eq!(config.upstream.servers, vec!["9.9.9.9"]);
        assert!(config.system_hosts.path().is_none());
    }

    #[test]
    fn test_overrides_validate_dot() {
        let mut config = Config::default();
        let result = config.apply_overrides(ServerOverrides {
            dot: true,
            tls_cert: Some("/tmp/cert.pem".into()),
            ..ServerOverrides::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("").unwrap(), Duration::from_secs(5));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        let value = "10000000000000000000s10000000000000000000s";

        assert!(matches!(
            parse_duration(value),
            Err(ValidationError::InvalidTimeout { .. })
        ));
        assert!(parse_duration("99999999999999999999999h").is_err());
    }
}
