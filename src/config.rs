// src/config.rs
//! Configuration for the taxi tool
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The file supports these sections:
//! - top level - `cache_dir`, `stage_root`, `language_dirs`
//! - [s3] - bucket, credentials, region, role to assume, endpoint
//! - [sftp] - host, port, default user and key, host key checking
//! - [agencies.*] - per-agency login user and key
//!
//! Loading never reads the process environment directly; callers pass the
//! variables in, so tests can exercise every layer without touching globals.

use crate::error::{Error, Result};
use crate::remote::Agency;
use crate::stage::DEFAULT_STAGE_ROOT;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "TAXI_CONFIG";

/// Default language subfolder pattern (two-letter codes)
pub const DEFAULT_LANGUAGE_DIR_PATTERN: &str = "[a-z][a-z]";

const REDACTED: &str = "<redacted>";

/// Effective configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Local cache for archives and deploy scratch directories
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Root of the stage directories on agency servers
    #[serde(default = "default_stage_root")]
    pub stage_root: String,

    /// Glob patterns for language subfolders excluded from `make`
    #[serde(default = "default_language_dirs")]
    pub language_dirs: Vec<String>,

    /// Object store settings
    #[serde(default)]
    pub s3: S3Section,

    /// Directory server settings
    #[serde(default)]
    pub sftp: SftpSection,

    /// Per-agency overrides
    #[serde(default)]
    pub agencies: BTreeMap<String, AgencySection>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            stage_root: default_stage_root(),
            language_dirs: default_language_dirs(),
            s3: S3Section::default(),
            sftp: SftpSection::default(),
            agencies: BTreeMap::new(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("taxi")
}

fn default_stage_root() -> String {
    DEFAULT_STAGE_ROOT.to_string()
}

fn default_language_dirs() -> Vec<String> {
    vec![DEFAULT_LANGUAGE_DIR_PATTERN.to_string()]
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

/// Object store section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Section {
    /// Bucket used when a command names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    /// Role assumed through STS before every client construction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    /// Custom endpoint (S3-compatible stores)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for S3Section {
    fn default() -> Self {
        Self {
            default_bucket: None,
            access_key_id: None,
            secret_access_key: None,
            region: default_region(),
            role_arn: None,
            endpoint: None,
        }
    }
}

/// Directory server section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user when no agency is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Private key used when the agency has none of its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,

    /// Verify server host keys against `~/.ssh/known_hosts`
    #[serde(default = "default_true")]
    pub strict_host_keys: bool,
}

impl Default for SftpSection {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            user: None,
            key: None,
            strict_host_keys: true,
        }
    }
}

/// Per-agency credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgencySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
}

/// Everything needed to open one agency's directory session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpLogin {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key: PathBuf,
    pub strict_host_keys: bool,
}

/// Environment variable carrying an agency's private key path
pub fn agency_key_var(agency: &str) -> String {
    let suffix: String = agency
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SFTP_KEY_{}", suffix)
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Settings {
    /// Parse a TOML document on top of the defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(format!("invalid config: {}", e)))
    }

    /// Load a TOML file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration from the process environment
    ///
    /// `explicit` (the `--config` flag) takes precedence over `$TAXI_CONFIG`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(explicit, std::env::vars())
    }

    /// Load configuration from an explicit set of environment variables
    pub fn load_from(
        explicit: Option<&Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| vars.get(CONFIG_ENV).and_then(|v| non_empty(v)).map(PathBuf::from));

        let mut settings = match file {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        settings.apply_env(&vars)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment variables
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        let get = |key: &str| vars.get(key).and_then(|v| non_empty(v));

        if let Some(dir) = get("TAXI_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(root) = get("TAXI_STAGE_ROOT") {
            self.stage_root = root;
        }
        if let Some(patterns) = get("TAXI_LANGUAGE_DIRS") {
            self.language_dirs = patterns
                .split(',')
                .filter_map(non_empty)
                .collect();
        }

        if let Some(bucket) = get("AWS_DEFAULT_BUCKET") {
            self.s3.default_bucket = Some(bucket);
        }
        if let Some(key) = get("AWS_ACCESS_KEY_ID") {
            self.s3.access_key_id = Some(key);
        }
        if let Some(secret) = get("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_access_key = Some(secret);
        }
        if let Some(region) = get("AWS_REGION") {
            self.s3.region = region;
        }
        if let Some(role) = get("AWS_ROLE_TO_ASSUME") {
            self.s3.role_arn = Some(role);
        }
        if let Some(endpoint) = get("AWS_ENDPOINT_URL") {
            self.s3.endpoint = Some(endpoint);
        }

        if let Some(host) = get("SFTP_HOST") {
            self.sftp.host = Some(host);
        }
        if let Some(port) = get("SFTP_PORT") {
            self.sftp.port = port
                .parse()
                .map_err(|_| Error::ConfigError(format!("SFTP_PORT is not a port: {}", port)))?;
        }
        if let Some(user) = get("SFTP_USER") {
            self.sftp.user = Some(user);
        }
        if let Some(key) = get("SFTP_KEY") {
            self.sftp.key = Some(PathBuf::from(key));
        }
        if let Some(strict) = get("SFTP_STRICT_HOST_KEYS") {
            self.sftp.strict_host_keys = is_truthy(&strict);
        }
        if get("DEV_ENV").is_some_and(|v| is_truthy(&v)) {
            self.sftp.strict_host_keys = false;
        }

        for (name, section) in self.agencies.iter_mut() {
            if let Some(key) = get(&agency_key_var(name)) {
                section.key = Some(PathBuf::from(key));
            }
        }
        for (var, value) in vars {
            if let Some(suffix) = var.strip_prefix("SFTP_KEY_")
                && let Some(path) = non_empty(value)
            {
                let name = suffix.to_ascii_lowercase();
                if !self.agencies.keys().any(|n| agency_key_var(n) == *var) {
                    self.agencies.entry(name).or_default().key = Some(PathBuf::from(path));
                }
            }
        }
        Ok(())
    }

    /// Reject values that cannot work
    pub fn validate(&self) -> Result<()> {
        if !self.stage_root.starts_with('/') {
            return Err(Error::ConfigError(format!(
                "stage_root must be absolute: {}",
                self.stage_root
            )));
        }
        for pattern in &self.language_dirs {
            glob::Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Bucket from the command line, else the configured default
    pub fn resolve_bucket(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .and_then(non_empty)
            .or_else(|| self.s3.default_bucket.clone())
            .ok_or_else(|| {
                Error::ConfigError(
                    "no bucket given and AWS_DEFAULT_BUCKET is not set".to_string(),
                )
            })
    }

    /// Login parameters for an agency's directory server
    pub fn sftp_login(&self, agency: &Agency) -> Result<SftpLogin> {
        let host = self
            .sftp
            .host
            .clone()
            .ok_or_else(|| Error::ConfigError("SFTP_HOST is not set".to_string()))?;

        let section = agency.name().and_then(|name| {
            self.agencies
                .get(name)
                .or_else(|| self.agencies.get(&name.to_ascii_lowercase()))
        });

        let user = match agency.name() {
            Some(name) => section
                .and_then(|s| s.user.clone())
                .unwrap_or_else(|| name.to_string()),
            None => self.sftp.user.clone().ok_or_else(|| {
                Error::ConfigError("no agency given and SFTP_USER is not set".to_string())
            })?,
        };

        let key = section
            .and_then(|s| s.key.clone())
            .or_else(|| self.sftp.key.clone())
            .ok_or_else(|| Error::ConfigError(format!("no SFTP key configured for {}", agency)))?;

        Ok(SftpLogin {
            host,
            port: self.sftp.port,
            user,
            key,
            strict_host_keys: self.sftp.strict_host_keys,
        })
    }

    /// Copy of the settings with secrets replaced
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.s3.access_key_id.is_some() {
            copy.s3.access_key_id = Some(REDACTED.to_string());
        }
        if copy.s3.secret_access_key.is_some() {
            copy.s3.secret_access_key = Some(REDACTED.to_string());
        }
        copy
    }

    /// TOML rendering with secrets redacted
    pub fn to_redacted_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.redacted())
            .map_err(|e| Error::ConfigError(format!("cannot render configuration: {}", e)))
    }

    /// Directory holding downloaded deploy packages
    pub fn deploy_cache(&self) -> PathBuf {
        self.cache_dir.join("deploy")
    }
}
