//! Application configuration for coenroll.
//!
//! User config lives at `~/.coenroll/coenroll.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoenrollError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coenroll.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coenroll";

// ---------------------------------------------------------------------------
// Config structs (matching coenroll.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry connection and enrollment defaults.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Organization list location.
    #[serde(default)]
    pub organizations: OrganizationsConfig,

    /// Bulk enrollment behaviour.
    #[serde(default)]
    pub enroll: EnrollConfig,
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry hostname or base URL. Bare hostnames are reached over HTTPS.
    #[serde(default)]
    pub server: Option<String>,

    /// CO (collaborative organization) id all people are enrolled into.
    #[serde(default = "default_co_id")]
    pub co_id: u64,

    /// API user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Name of the env var holding the API password (never store the password itself).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// CO groups every new person joins.
    #[serde(default)]
    pub group_ids: Vec<u64>,

    /// COU the new person's role is attached to, if any.
    #[serde(default)]
    pub cou_id: Option<u64>,

    /// Affiliation recorded on the new person's role.
    #[serde(default = "default_affiliation")]
    pub affiliation: String,

    /// Identifier type the registry issues as the access id.
    #[serde(default = "default_identifier_type")]
    pub identifier_type: String,

    /// Identifier type of the login identifier attached to the org identity.
    #[serde(default = "default_login_identifier_type")]
    pub login_identifier_type: String,

    /// Domain appended to the access id to form the login identifier.
    #[serde(default = "default_login_domain")]
    pub login_domain: String,

    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            server: None,
            co_id: default_co_id(),
            username: None,
            password_env: default_password_env(),
            group_ids: Vec::new(),
            cou_id: None,
            affiliation: default_affiliation(),
            identifier_type: default_identifier_type(),
            login_identifier_type: default_login_identifier_type(),
            login_domain: default_login_domain(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_co_id() -> u64 {
    2
}
fn default_password_env() -> String {
    "COENROLL_PASSWORD".into()
}
fn default_affiliation() -> String {
    "member".into()
}
fn default_identifier_type() -> String {
    "accessid".into()
}
fn default_login_identifier_type() -> String {
    "eppn".into()
}
fn default_login_domain() -> String {
    "access-ci.org".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[organizations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationsConfig {
    /// Local organization list, one name per line.
    #[serde(default = "default_organizations_path")]
    pub path: PathBuf,

    /// Published canonical list, downloaded when `path` does not exist.
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Default for OrganizationsConfig {
    fn default() -> Self {
        Self {
            path: default_organizations_path(),
            source_url: None,
        }
    }
}

fn default_organizations_path() -> PathBuf {
    PathBuf::from("organizations.txt")
}

/// `[enroll]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollConfig {
    /// What a failed row does to the rest of the batch.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// What the bulk enroller does when a row fails with a registry error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failed row.
    #[default]
    Abort,
    /// Log the failure and continue with the next row.
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = CoenrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(CoenrollError::config(format!(
                "invalid failure policy '{other}': expected 'abort' or 'skip'"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct RegistryOverrides {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fully resolved registry connection settings.
#[derive(Clone)]
pub struct RegistrySettings {
    /// Base URL ending in `/`; endpoint paths are joined onto it.
    pub base_url: Url,
    pub co_id: u64,
    pub username: String,
    pub password: String,
    pub group_ids: Vec<u64>,
    pub cou_id: Option<u64>,
    pub affiliation: String,
    pub identifier_type: String,
    pub login_identifier_type: String,
    pub login_domain: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for RegistrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySettings")
            .field("base_url", &self.base_url.as_str())
            .field("co_id", &self.co_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("group_ids", &self.group_ids)
            .field("cou_id", &self.cou_id)
            .field("affiliation", &self.affiliation)
            .field("identifier_type", &self.identifier_type)
            .field("login_identifier_type", &self.login_identifier_type)
            .field("login_domain", &self.login_domain)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RegistrySettings {
    /// Merge the config file with command-line overrides.
    ///
    /// The password falls back to the env var named by `password_env`.
    pub fn resolve(config: &AppConfig, overrides: RegistryOverrides) -> Result<Self> {
        let registry = &config.registry;

        let server = overrides
            .server
            .or_else(|| registry.server.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CoenrollError::config("no registry server configured (use --server or [registry] server)")
            })?;

        let username = overrides
            .username
            .or_else(|| registry.username.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CoenrollError::config("no registry user configured (use --user or [registry] username)")
            })?;

        let password = match overrides.password.filter(|s| !s.is_empty()) {
            Some(password) => password,
            None => match std::env::var(&registry.password_env) {
                Ok(val) if !val.is_empty() => val,
                _ => {
                    return Err(CoenrollError::config(format!(
                        "registry password not found. Set the {} environment variable.",
                        registry.password_env
                    )));
                }
            },
        };

        Ok(Self {
            base_url: base_url(&server)?,
            co_id: registry.co_id,
            username,
            password,
            group_ids: registry.group_ids.clone(),
            cou_id: registry.cou_id,
            affiliation: registry.affiliation.clone(),
            identifier_type: registry.identifier_type.clone(),
            login_identifier_type: registry.login_identifier_type.clone(),
            login_domain: registry.login_domain.clone(),
            timeout_secs: registry.timeout_secs,
        })
    }
}

/// Turn a hostname or URL into a base URL with a trailing slash.
pub fn base_url(server: &str) -> Result<Url> {
    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{server}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| CoenrollError::config(format!("invalid registry server '{server}': {e}")))?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coenroll/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CoenrollError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coenroll/coenroll.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CoenrollError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CoenrollError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CoenrollError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CoenrollError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CoenrollError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("password_env"));
        assert!(toml_str.contains("COENROLL_PASSWORD"));
        assert!(toml_str.contains("access-ci.org"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.registry.co_id, 2);
        assert_eq!(parsed.registry.identifier_type, "accessid");
        assert_eq!(parsed.enroll.on_failure, FailurePolicy::Abort);
    }

    #[test]
    fn config_with_registry_section() {
        let toml_str = r#"
[registry]
server = "registry.example.org"
co_id = 7
username = "co_7.enroller"
group_ids = [11, 12]

[organizations]
path = "/tmp/orgs.txt"
source_url = "https://lists.example.org/organizations.txt"

[enroll]
on_failure = "skip"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.registry.co_id, 7);
        assert_eq!(config.registry.group_ids, vec![11, 12]);
        assert_eq!(config.organizations.path, PathBuf::from("/tmp/orgs.txt"));
        assert_eq!(config.enroll.on_failure, FailurePolicy::Skip);
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config = AppConfig::default();
        config.registry.server = Some("file.example.org".into());
        config.registry.username = Some("file-user".into());

        let settings = RegistrySettings::resolve(
            &config,
            RegistryOverrides {
                server: Some("flag.example.org".into()),
                username: None,
                password: Some("secret".into()),
            },
        )
        .expect("resolve");

        assert_eq!(settings.base_url.as_str(), "https://flag.example.org/");
        assert_eq!(settings.username, "file-user");
        assert!(!format!("{settings:?}").contains("secret"));
    }

    #[test]
    fn missing_password_is_config_error() {
        let mut config = AppConfig::default();
        config.registry.server = Some("registry.example.org".into());
        config.registry.username = Some("user".into());
        // Use a unique env var name to avoid interfering with other tests
        config.registry.password_env = "COENROLL_TEST_NONEXISTENT_PASSWORD_12345".into();

        let result = RegistrySettings::resolve(&config, RegistryOverrides::default());
        assert!(result.unwrap_err().to_string().contains("password not found"));
    }

    #[test]
    fn base_url_keeps_explicit_scheme_and_path() {
        assert_eq!(
            base_url("http://localhost:8080/registry").unwrap().as_str(),
            "http://localhost:8080/registry/"
        );
        assert_eq!(
            base_url("registry.example.org").unwrap().as_str(),
            "https://registry.example.org/"
        );
    }

    #[test]
    fn failure_policy_parses() {
        assert_eq!("skip".parse::<FailurePolicy>().unwrap(), FailurePolicy::Skip);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
