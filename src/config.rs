// Session configuration (defaults, gcr-login.toml, overrides)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_REGISTRY_URL: &str = "https://gcr.io";

/// Pseudo-username the registry accepts for OAuth access tokens
pub const DEFAULT_USERNAME: &str = "_token";

pub const DEFAULT_METADATA_ENDPOINT: &str =
    "http://metadata.google.internal./computeMetadata/v1/instance/service-accounts/default/token";

pub const DEFAULT_CREDENTIAL_FILE_NAME: &str = ".dockercfg";

pub const DEFAULT_CONTAINER_CLI: &str = "docker";

/// Everything a session needs, passed in explicitly at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub registry_url: String,
    pub username: String,
    pub metadata_endpoint: String,
    /// Explicit credential file. When unset the path is `$HOME/<credential_file_name>`
    /// on the execution host.
    pub credential_file: Option<PathBuf>,
    pub credential_file_name: String,
    /// Container CLI used for `login` (docker or podman)
    pub container_cli: String,
    /// Metadata request deadline. Unset means none; the caller owns deadlines.
    pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            credential_file: None,
            credential_file_name: DEFAULT_CREDENTIAL_FILE_NAME.to_string(),
            container_cli: DEFAULT_CONTAINER_CLI.to_string(),
            timeout: None,
        }
    }
}

impl SessionConfig {
    /// Name of the credential file as shown in log messages
    pub fn display_file_name(&self) -> String {
        self.credential_file
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.credential_file_name.clone())
    }

    /// Overlay values present in a config file
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(registry) = &file.registry {
            if let Some(url) = &registry.url {
                self.registry_url = url.clone();
            }
            if let Some(username) = &registry.username {
                self.username = username.clone();
            }
            if let Some(cli) = &registry.container_cli {
                self.container_cli = cli.clone();
            }
        }
        if let Some(metadata) = &file.metadata {
            if let Some(endpoint) = &metadata.endpoint {
                self.metadata_endpoint = endpoint.clone();
            }
            if let Some(secs) = metadata.timeout_secs {
                self.timeout = Some(Duration::from_secs(secs));
            }
        }
        if let Some(credentials) = &file.credentials {
            if let Some(path) = &credentials.file {
                self.credential_file = Some(path.clone());
            }
            if let Some(name) = &credentials.file_name {
                self.credential_file_name = name.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.registry_url)
            .with_context(|| format!("Invalid registry URL '{}'", self.registry_url))?;

        let endpoint = url::Url::parse(&self.metadata_endpoint)
            .with_context(|| format!("Invalid metadata endpoint '{}'", self.metadata_endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            bail!(
                "Metadata endpoint must be an http(s) URL, got scheme '{}'",
                endpoint.scheme()
            );
        }

        if self.username.trim().is_empty() {
            bail!("Registry username must not be empty");
        }
        if self.container_cli.trim().is_empty() {
            bail!("Container CLI must not be empty");
        }
        if self.credential_file_name.is_empty()
            || self.credential_file_name.contains(std::path::MAIN_SEPARATOR)
        {
            bail!(
                "Credential file name '{}' must be a bare file name",
                self.credential_file_name
            );
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            bail!("Metadata timeout must be greater than zero");
        }

        Ok(())
    }
}

/// Root structure of gcr-login.toml
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    /// Optional version (must be 1 if present)
    pub version: Option<u32>,

    #[serde(default)]
    pub registry: Option<RegistrySection>,

    #[serde(default)]
    pub metadata: Option<MetadataSection>,

    #[serde(default)]
    pub credentials: Option<CredentialsSection>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct RegistrySection {
    pub url: Option<String>,
    pub username: Option<String>,
    pub container_cli: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct MetadataSection {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct CredentialsSection {
    pub file: Option<PathBuf>,
    pub file_name: Option<String>,
}

/// Load a gcr-login.toml file
///
/// Unknown fields are reported as warnings, not errors.
/// Returns Err if the file cannot be read or parsed, or if the version is unsupported.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    info!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    // Deserialize and collect any unused fields
    let mut unused_fields = Vec::new();
    let deserializer = toml::Deserializer::new(&content);
    let config: ConfigFile = serde_ignored::deserialize(deserializer, |field| {
        unused_fields.push(field.to_string());
    })
    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    for field in &unused_fields {
        warn!(
            "Unknown configuration field in {}: {}",
            path.display(),
            field
        );
    }

    if let Some(version) = config.version {
        if version != 1 {
            bail!(
                "Unsupported config version: {}. This version of gcr-login supports version 1.",
                version
            );
        }
    } else {
        debug!("No version specified in {}, using latest", path.display());
    }

    Ok(config)
}
