/* src/config.rs */

use crate::error::Error;
use crate::record::parse_absolute_name;
use crate::transport::Protocol;
use crate::tsig::{TsigAlgorithm, TsigKey};
use fancy_log::{LogLevel, log};
use hickory_proto::rr::Name;
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything one zone's operations need. Immutable once built, so it can be
/// shared between concurrent calls without locking.
#[derive(Debug, Clone)]
pub struct ZoneContext {
    zone: Name,
    server: SocketAddr,
    default_ttl: u32,
    key: TsigKey,
    timeout: Duration,
    protocol: Protocol,
}

impl ZoneContext {
    pub fn new(zone: &str, server: SocketAddr, default_ttl: u32, key: TsigKey) -> Result<Self, Error> {
        let zone = zone.trim();
        if zone.is_empty() || zone == "." {
            return Err(Error::Configuration("zone name is missing".into()));
        }
        let zone = parse_absolute_name("zone", zone)
            .map_err(|e| Error::Configuration(format!("zone: {}", e)))?;

        Ok(Self {
            zone,
            server,
            default_ttl,
            key,
            timeout: DEFAULT_TIMEOUT,
            protocol: Protocol::default(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, Error> {
        if timeout.is_zero() {
            return Err(Error::Configuration("timeout must be greater than zero".into()));
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn zone(&self) -> &Name {
        &self.zone
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    pub fn key(&self) -> &TsigKey {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

/// Raw settings as read from the TOML file and the environment.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub zone: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub ttl: Option<u32>,
    pub key_name: Option<String>,
    pub key_secret: Option<String>,
    pub key_algorithm: Option<String>,
    pub timeout_secs: Option<u64>,
    pub protocol: Option<Protocol>,
}

impl Settings {
    /// Loads the TOML file from `CONFIG_PATH` or `~/.config/simple-nsupdate/config.toml`
    /// (when present), then applies environment overrides.
    pub fn load() -> Result<Self, Error> {
        let config_path = env::var("CONFIG_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                dirs::config_dir().map(|dir| dir.join("simple-nsupdate").join("config.toml"))
            });

        let mut settings = match config_path {
            Some(path) if path.exists() => {
                log(LogLevel::Info, &format!("Loading config from {:?}", path));
                let config_str = fs::read_to_string(&path).map_err(|e| {
                    Error::Configuration(format!("cannot read {:?}: {}", path, e))
                })?;
                Self::from_toml(&config_str)?
            }
            Some(path) => {
                log(
                    LogLevel::Debug,
                    &format!("No config file at {:?}, using environment only", path),
                );
                Self::default()
            }
            None => Self::default(),
        };

        settings.apply_env(|key| env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Configuration(format!("invalid config file: {}", e)))
    }

    /// Overrides fields from `ZONE`, `SERVER`, `PORT`, `TTL`, `KEY_NAME`,
    /// `KEY_SECRET`, `KEY_ALGO`, `TIMEOUT` and `PROTOCOL`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ZONE") {
            self.zone = Some(v);
        }
        if let Some(v) = get("SERVER") {
            self.server = Some(v);
        }
        if let Some(v) = get("PORT") {
            self.port = Some(parse_number("PORT", &v)?);
        }
        if let Some(v) = get("TTL") {
            self.ttl = Some(parse_number("TTL", &v)?);
        }
        if let Some(v) = get("KEY_NAME") {
            self.key_name = Some(v);
        }
        if let Some(v) = get("KEY_SECRET") {
            self.key_secret = Some(v);
        }
        if let Some(v) = get("KEY_ALGO") {
            self.key_algorithm = Some(v);
        }
        if let Some(v) = get("TIMEOUT") {
            self.timeout_secs = Some(parse_number("TIMEOUT", &v)?);
        }
        if let Some(v) = get("PROTOCOL") {
            self.protocol = Some(v.parse()?);
        }
        Ok(())
    }

    /// Resolves the server address and builds the key. Fails before any DNS traffic.
    pub fn into_context(self) -> Result<ZoneContext, Error> {
        let zone = required(self.zone, "ZONE")?;
        let server = required(self.server, "SERVER")?;
        let ttl = required(self.ttl, "TTL")?;
        let key_name = required(self.key_name, "KEY_NAME")?;
        let key_secret = required(self.key_secret, "KEY_SECRET")?;
        let algorithm = match self.key_algorithm {
            Some(name) => name.parse()?,
            None => TsigAlgorithm::default(),
        };

        let server = resolve_server(&server, self.port.unwrap_or(DEFAULT_PORT))?;
        let key = TsigKey::new(&key_name, &key_secret, algorithm)?;
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(ZoneContext::new(&zone, server, ttl, key)?
            .with_timeout(timeout)?
            .with_protocol(self.protocol.unwrap_or_default()))
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::Configuration(format!("{} is not set", key)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

/// Accepts `ip`, `ip:port`, `[v6]:port`, or a host name.
pub fn resolve_server(server: &str, port: u16) -> Result<SocketAddr, Error> {
    let server = server.trim();
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (server, port)
        .to_socket_addrs()
        .map_err(|e| Error::Configuration(format!("cannot resolve server '{}': {}", server, e)))?
        .next()
        .ok_or_else(|| Error::Configuration(format!("server '{}' has no addresses", server)))
}
