// External crates
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Errors raised while resolving the connection configuration. All of them are
/// fatal and happen before any network interaction.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse a TOML configuration file.
    #[error("Failed to parse TOML from {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Failed to parse a JSON configuration file.
    #[error("Failed to parse JSON from {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Neither the config file nor the command line named a server.
    #[error("Must provide at least one server")]
    NoServers,
    /// Only one half of the client certificate pair was given.
    #[error("Both a cert file and a key file are required for TLS client authentication")]
    IncompleteTls,
}

/// TLS material used when connecting to the NATS servers.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct TlsConfig {
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub ca_files: Vec<PathBuf>,
}

impl TlsConfig {
    /// Client certificate and key, when both are configured.
    pub fn client_identity(&self) -> Option<(&Path, &Path)> {
        match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        Ok(())
    }
}

/// Connection settings shared by every command.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct NatsConfig {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default, rename = "tls_conf")]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub log_subject: String,
}

/// Server and TLS settings as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlags {
    pub servers: Vec<String>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_files: Vec<PathBuf>,
}

impl ConnectionFlags {
    fn has_tls(&self) -> bool {
        self.cert_file.is_some() || self.key_file.is_some() || !self.ca_files.is_empty()
    }

    /// Whether any server or TLS flag was given.
    pub fn is_set(&self) -> bool {
        !self.servers.is_empty() || self.has_tls()
    }
}

impl NatsConfig {
    /// Load and parse a configuration file. Files ending in `.json` are read as
    /// JSON, everything else as TOML.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading nats-util configuration file"
        );

        let config_str = fs::read_to_string(path_ref).map_err(|source| {
            tracing::error!(error = %source, "Failed to read configuration file");
            ConfigError::Read {
                path: path_ref.to_path_buf(),
                source,
            }
        })?;

        let is_json = path_ref
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: NatsConfig = if is_json {
            serde_json::from_str(&config_str).map_err(|source| ConfigError::Json {
                path: path_ref.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(&config_str).map_err(|source| ConfigError::Toml {
                path: path_ref.to_path_buf(),
                source,
            })?
        };

        tracing::trace!(configuration_file_path = %path_ref.display(), "nats-util configuration file loaded successfully");
        Ok(config)
    }

    /// Build the configuration from command line flags alone.
    pub fn from_flags(flags: &ConnectionFlags) -> Self {
        let tls = flags.has_tls().then(|| TlsConfig {
            cert_file: flags.cert_file.clone(),
            key_file: flags.key_file.clone(),
            ca_files: flags.ca_files.clone(),
        });

        Self {
            servers: flags.servers.clone(),
            tls,
            log_subject: String::new(),
        }
    }

    /// Resolve the effective configuration. A config file, when given, is
    /// authoritative for servers and TLS and the matching flags are ignored.
    pub fn resolve(
        config_file: Option<&Path>,
        flags: &ConnectionFlags,
    ) -> Result<Self, ConfigError> {
        let config = match config_file {
            Some(path) => {
                if flags.is_set() {
                    tracing::debug!(
                        configuration_file_path = %path.display(),
                        "Config file given, ignoring server and TLS flags"
                    );
                }
                Self::load(path)?
            }
            None => {
                tracing::info!("Configuring from the command line");
                Self::from_flags(flags)
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::NoServers);
        }
        if let Some(tls) = &self.tls {
            tls.validate()?;
        }
        Ok(())
    }

    /// Comma separated server list, the form the NATS client expects.
    pub fn server_string(&self) -> String {
        self.servers
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}
