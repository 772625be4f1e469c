use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default captive portal base URL
const DEFAULT_PORTAL_URL: &str = "http://172.16.68.6:8090";

/// Login form endpoint, relative to the portal base URL
const LOGIN_PATH: &str = "/httpclient.html";

/// Logout endpoint, relative to the portal base URL
const LOGOUT_PATH: &str = "/logout.xml";

/// Endpoint that answers 204 when the internet is reachable
const DEFAULT_PROBE_URL: &str = "http://www.google.com/generate_204";

/// 10 MiB reference object for the speed test
const DEFAULT_SPEED_TEST_URL: &str = "https://sabnzbd.org/tests/internetspeed/10MB.bin";

/// Time between login cycles
const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Environment variable name for portal URL override
const ENV_PORTAL_URL: &str = "PORTALKEEPER_PORTAL_URL";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    portal: Option<PortalSection>,
    probe: Option<UrlSection>,
    speed_test: Option<UrlSection>,
    service: Option<ServiceSection>,
}

#[derive(Debug, Deserialize, Default)]
struct PortalSection {
    /// Portal base URL (e.g., "http://172.16.68.6:8090")
    base_url: Option<String>,
    /// Full login URL, overrides `base_url` + "/httpclient.html"
    login_url: Option<String>,
    /// Full logout URL, overrides `base_url` + "/logout.xml"
    logout_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UrlSection {
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceSection {
    interval_secs: Option<u64>,
}

/// Runtime portal configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub login_url: String,
    pub logout_url: String,
    pub probe_url: String,
    pub speed_test_url: String,
    /// Period of the repeating login-cycle timer
    pub check_interval: Duration,
    /// Source of the portal endpoints (for display)
    pub source: ConfigSource,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self::for_portal(DEFAULT_PORTAL_URL, ConfigSource::Default)
    }
}

impl PortalConfig {
    /// Default configuration pointing at the portal served from `base_url`.
    pub fn for_portal(base_url: &str, source: ConfigSource) -> Self {
        let base = normalize_url(base_url);
        Self {
            login_url: format!("{}{}", base, LOGIN_PATH),
            logout_url: format!("{}{}", base, LOGOUT_PATH),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            speed_test_url: DEFAULT_SPEED_TEST_URL.to_string(),
            check_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            source,
        }
    }
}

/// Where the portal endpoints came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn non_empty(url: Option<String>) -> Option<String> {
    url.map(|u| normalize_url(&u)).filter(|u| !u.is_empty())
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("portalkeeper").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load portal configuration with priority:
/// 1. Environment variable (PORTALKEEPER_PORTAL_URL)
/// 2. Config file (~/.config/portalkeeper/config.toml)
/// 3. Default values
pub fn load_portal_config() -> PortalConfig {
    resolve_config(std::env::var(ENV_PORTAL_URL).ok(), load_config_file())
}

/// Merge an environment override and a parsed config file over the defaults.
///
/// The environment variable only replaces the portal endpoints; probe,
/// speed test and interval settings still come from the file.
pub fn resolve_config(env_portal_url: Option<String>, file: Option<ConfigFile>) -> PortalConfig {
    let file = file.unwrap_or_default();
    let portal = file.portal.unwrap_or_default();

    let mut config = if let Some(url) = non_empty(env_portal_url) {
        tracing::info!("Using portal URL from environment variable: {}", url);
        PortalConfig::for_portal(&url, ConfigSource::Environment)
    } else {
        let base = non_empty(portal.base_url);
        let login = non_empty(portal.login_url);
        let logout = non_empty(portal.logout_url);

        if base.is_some() || login.is_some() || logout.is_some() {
            let mut config = PortalConfig::for_portal(
                base.as_deref().unwrap_or(DEFAULT_PORTAL_URL),
                ConfigSource::ConfigFile,
            );
            if let Some(login) = login {
                config.login_url = login;
            }
            if let Some(logout) = logout {
                config.logout_url = logout;
            }
            tracing::info!("Using portal login URL from config file: {}", config.login_url);
            config
        } else {
            tracing::debug!("Using default portal URL: {}", DEFAULT_PORTAL_URL);
            PortalConfig::default()
        }
    };

    if let Some(url) = non_empty(file.probe.and_then(|p| p.url)) {
        config.probe_url = url;
    }
    if let Some(url) = non_empty(file.speed_test.and_then(|s| s.url)) {
        config.speed_test_url = url;
    }
    match file.service.and_then(|s| s.interval_secs) {
        Some(0) => tracing::warn!("Ignoring zero interval_secs in config file"),
        Some(secs) => config.check_interval = Duration::from_secs(secs),
        None => {}
    }

    config
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/portalkeeper/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Portalkeeper Configuration
# Place this file at: ~/.config/portalkeeper/config.toml

[portal]
# Captive portal base URL
# Default: http://172.16.68.6:8090
# base_url = "http://10.0.0.1:8090"

# Explicit endpoints (optional, derived from base_url if not set)
# login_url = "http://10.0.0.1:8090/httpclient.html"
# logout_url = "http://10.0.0.1:8090/logout.xml"

[probe]
# url = "http://www.google.com/generate_204"

[speed_test]
# url = "https://sabnzbd.org/tests/internetspeed/10MB.bin"

[service]
# Seconds between connectivity checks
# interval_secs = 60
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Option<ConfigFile> {
        Some(toml::from_str(toml_text).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_config(None, None);
        assert_eq!(config.source, ConfigSource::Default);
        assert_eq!(config.login_url, "http://172.16.68.6:8090/httpclient.html");
        assert_eq!(config.logout_url, "http://172.16.68.6:8090/logout.xml");
        assert_eq!(config.probe_url, DEFAULT_PROBE_URL);
        assert_eq!(config.check_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_file_portal() {
        let file = parse("[portal]\nbase_url = \"http://file:1\"\n[service]\ninterval_secs = 30\n");
        let config = resolve_config(Some(" http://env:2/ ".to_string()), file);
        assert_eq!(config.source, ConfigSource::Environment);
        assert_eq!(config.login_url, "http://env:2/httpclient.html");
        assert_eq!(config.check_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_file_explicit_endpoints() {
        let file = parse(
            "[portal]\nlogin_url = \"http://p/login\"\n[probe]\nurl = \"http://probe/\"\n",
        );
        let config = resolve_config(Some("   ".to_string()), file);
        assert_eq!(config.source, ConfigSource::ConfigFile);
        assert_eq!(config.login_url, "http://p/login");
        assert_eq!(config.logout_url, "http://172.16.68.6:8090/logout.xml");
        assert_eq!(config.probe_url, "http://probe");
    }

    #[test]
    fn test_zero_interval_ignored() {
        let config = resolve_config(None, parse("[service]\ninterval_secs = 0\n"));
        assert_eq!(config.check_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_example_config_parses() {
        let file: ConfigFile = toml::from_str(&generate_example_config()).unwrap();
        assert!(file.portal.is_some());
    }
}
