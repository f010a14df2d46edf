use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use toml;
use url::Url;

const OLLAMA_DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("failed to read config \"{}\": {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid backend host \"{host}\": {reason}")]
    InvalidBackend { host: String, reason: String },
    #[error("no backends are configured, add a [[backends]] entry or pass --backend")]
    NoBackends,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub(crate) struct Server {
    pub listen: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            listen: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub(crate) struct Discovery {
    pub timeout_secs: u64,
    /// Zero disables the background refresh
    pub refresh_interval_secs: u64,
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery {
            timeout_secs: 10,
            refresh_interval_secs: 0,
        }
    }
}

impl Discovery {
    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub(crate) struct Forwarding {
    pub timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
}

impl Default for Forwarding {
    fn default() -> Self {
        Forwarding {
            timeout_secs: 300,
            stream_idle_timeout_secs: 120,
        }
    }
}

impl Forwarding {
    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

/// A backend entry as written in the config file or on the command line.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct BackendConfig {
    pub id: Option<String>,
    pub host: String,
    pub timeout_secs: Option<u64>,
}

impl BackendConfig {
    pub(crate) fn from_host<S: Into<String>>(host: S) -> BackendConfig {
        BackendConfig {
            id: None,
            host: host.into(),
            timeout_secs: None,
        }
    }

    pub(crate) fn resolve(&self, default_timeout: Duration) -> Result<BackendSpec, Error> {
        let address = normalize_host(&self.host)?;

        Ok(BackendSpec {
            id: self.id.clone().unwrap_or_else(|| address.clone()),
            address,
            discovery_timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout),
        })
    }
}

/// A validated backend entry. The address is the backend's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackendSpec {
    pub id: String,
    pub address: String,
    pub discovery_timeout: Duration,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub(crate) struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub forwarding: Forwarding,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Turns `host`, `host:port` or a URL into an absolute base URL without a
/// trailing slash. A bare host gets the Ollama default port.
pub(crate) fn normalize_host(host: &str) -> Result<String, Error> {
    let invalid = |reason: &str| Error::InvalidBackend {
        host: host.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = host.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return Err(invalid("the host is empty"));
    }

    let (with_scheme, bare) = match trimmed.split_once("://") {
        Some(_) => (trimmed.to_string(), false),
        None => (format!("http://{}", trimmed), true),
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https backends are supported"));
    }

    if url.host_str().is_none() {
        return Err(invalid("the host is missing"));
    }

    if bare && !has_explicit_port(trimmed) {
        url.set_port(Some(OLLAMA_DEFAULT_PORT))
            .map_err(|_| invalid("cannot carry a port"))?;
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn has_explicit_port(authority: &str) -> bool {
    let authority = authority.split('/').next().unwrap_or_default();
    // Skip over a bracketed IPv6 literal
    let after_host = authority.rsplit(']').next().unwrap_or(authority);

    match after_host.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Where the set of backends comes from. The config file (if any) is re-read
/// on every call to [`BackendSource::load`], so backends can be added or
/// removed without a restart. Backends given on the command line are pinned.
#[derive(Debug, Clone)]
pub(crate) struct BackendSource {
    path: Option<PathBuf>,
    pinned: Vec<BackendConfig>,
    default_timeout: Duration,
}

impl BackendSource {
    pub(crate) fn new(
        path: Option<PathBuf>,
        pinned: Vec<BackendConfig>,
        default_timeout: Duration,
    ) -> BackendSource {
        BackendSource {
            path,
            pinned,
            default_timeout,
        }
    }

    pub(crate) fn pinned(backends: Vec<BackendConfig>) -> BackendSource {
        BackendSource::new(None, backends, Discovery::default().timeout())
    }

    /// The current backend set, de-duplicated by address. The first entry
    /// for an address wins.
    pub(crate) async fn load(&self) -> Result<Vec<BackendSpec>, Error> {
        let mut configs = Vec::new();

        if let Some(path) = &self.path {
            let raw = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Error::Read {
                    path: path.clone(),
                    source,
                })?;

            let config: Config = toml::de::from_str(&raw)?;

            configs.extend(config.backends);
        }

        configs.extend(self.pinned.iter().cloned());

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(configs.len());

        for config in configs {
            let spec = config.resolve(self.default_timeout)?;

            if seen.insert(spec.address.clone()) {
                specs.push(spec);
            }
        }

        Ok(specs)
    }
}

pub(crate) fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/crossroute/config.toml", ".crossroute.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/crossroute.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn extraneous_keys_helper<'a>(
    path: &mut Vec<String>,
    user_config: &'a toml::Value,
    config: &'a toml::Value,
    found: &mut Vec<String>,
) {
    match (user_config, config) {
        (toml::Value::Table(user_table), toml::Value::Table(table)) => {
            for (user_key, user_value) in user_table {
                path.push(user_key.clone());

                match table.get(user_key) {
                    Some(value) => extraneous_keys_helper(path, user_value, value, found),
                    None => found.push(path.join(".")),
                }

                path.pop();
            }
        }
        (toml::Value::Array(user_items), toml::Value::Array(items)) => {
            for (i, (user_item, item)) in user_items.iter().zip(items).enumerate() {
                path.push(i.to_string());
                extraneous_keys_helper(path, user_item, item, found);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Keys present in `raw_config` that were not understood, as dotted paths.
pub(crate) fn extraneous_keys(config: &Config, raw_config: &str) -> Result<Vec<String>, Error> {
    let user_config: toml::Table = toml::de::from_str(raw_config)?;

    // Round-tripping through the typed config drops everything unknown
    let known = toml::Value::try_from(config).unwrap_or(toml::Value::Table(toml::Table::new()));

    let mut found = Vec::new();

    extraneous_keys_helper(
        &mut Vec::new(),
        &toml::Value::Table(user_config),
        &known,
        &mut found,
    );

    Ok(found)
}

pub(crate) fn read_config(path: Option<&Path>) -> Result<Config, Error> {
    let path = match path {
        Some(path) => path,
        None => return Ok(Config::default()),
    };

    let raw_config = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = toml::de::from_str(&raw_config)?;

    for key in extraneous_keys(&config, &raw_config)? {
        tracing::warn!("config contains extraneous key \"{}\", ignoring", key);
    }

    Ok(config)
}
