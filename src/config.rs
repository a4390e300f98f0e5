use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::renderer::{
    RenderOptions, DEFAULT_POLL_INTERVAL, DEFAULT_READY_EXPRESSION, DEFAULT_WAIT_TIMEOUT,
};
use crate::{PrerenderError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub bind: SocketAddr,
    pub target: String,
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub unfinished: bool,
    pub remove_scripts: bool,
    pub redirect_prefixes: Vec<String>,
    pub ready_expression: String,
    pub chrome: ChromeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ChromeConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub args: Vec<String>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            window_width: 1280,
            window_height: 800,
            args: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 13000)),
            target: "http://localhost:3000".to_string(),
            wait: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            unfinished: false,
            remove_scripts: false,
            redirect_prefixes: vec![
                "/static".to_string(),
                "/api".to_string(),
                "/favicon.ico".to_string(),
            ],
            ready_expression: DEFAULT_READY_EXPRESSION.to_string(),
            chrome: ChromeConfig::default(),
        }
    }
}

impl Config {
    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    PrerenderError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        let target = Url::parse(&self.target)?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(PrerenderError::Config(format!(
                "target must be an http(s) URL, got {}",
                self.target
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(PrerenderError::Config(
                "poll-interval must be greater than zero".to_string(),
            ));
        }
        if let Some(prefix) = self.redirect_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(PrerenderError::Config(format!(
                "redirect prefix {prefix:?} must start with '/'"
            )));
        }
        if self.ready_expression.trim().is_empty() {
            return Err(PrerenderError::Config(
                "ready-expression must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            target_base_url: self.target.clone(),
            wait_timeout: self.wait,
            poll_interval: self.poll_interval,
            return_unfinished_pages: self.unfinished,
            remove_scripts: self.remove_scripts,
            ready_expression: self.ready_expression.clone(),
        }
    }
}

#[cfg(feature = "chromium")]
impl From<&ChromeConfig> for crate::engine::chromium::ChromiumOptions {
    fn from(cfg: &ChromeConfig) -> Self {
        Self {
            executable: cfg.executable.clone(),
            headless: cfg.headless,
            no_sandbox: cfg.no_sandbox,
            window_width: cfg.window_width,
            window_height: cfg.window_height,
            args: cfg.args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.bind.port(), 13000);
        assert_eq!(cfg.target, "http://localhost:3000");
        assert_eq!(cfg.wait, Duration::from_secs(3));
        assert_eq!(cfg.poll_interval, Duration::from_millis(50));
        assert!(!cfg.unfinished);
        assert!(!cfg.remove_scripts);
        assert_eq!(cfg.redirect_prefixes, ["/static", "/api", "/favicon.ico"]);
        assert!(cfg.chrome.headless);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_toml_with_humantime_durations() {
        let cfg = Config::from_toml_str(
            r#"
bind = "127.0.0.1:8080"
target = "https://app.example.com"
wait = "1s 500ms"
poll-interval = "20ms"
unfinished = true
remove-scripts = true
redirect-prefixes = ["/assets"]

[chrome]
no-sandbox = true
executable = "/usr/bin/chromium"
"#,
        )
        .unwrap();

        assert_eq!(cfg.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cfg.target, "https://app.example.com");
        assert_eq!(cfg.wait, Duration::from_millis(1500));
        assert_eq!(cfg.poll_interval, Duration::from_millis(20));
        assert!(cfg.unfinished);
        assert!(cfg.remove_scripts);
        assert_eq!(cfg.redirect_prefixes, ["/assets"]);
        assert!(cfg.chrome.no_sandbox);
        assert!(cfg.chrome.headless);
        assert_eq!(cfg.chrome.executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(cfg.ready_expression, DEFAULT_READY_EXPRESSION);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("wiat = \"3s\"").unwrap_err();
        assert!(matches!(err, PrerenderError::TomlParse(_)), "{err}");
    }

    #[test]
    fn validate_rejects_bad_target_and_prefixes() {
        let cfg = Config {
            target: "localhost:3000".to_string(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            target: "ftp://files.example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(PrerenderError::Config(_))));

        let cfg = Config {
            redirect_prefixes: vec!["static".to_string()],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(PrerenderError::Config(_))));

        let cfg = Config {
            poll_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(PrerenderError::Config(_))));
    }

    #[test]
    fn render_options_carry_policies() {
        let cfg = Config {
            unfinished: true,
            remove_scripts: true,
            wait: Duration::from_secs(7),
            ..Config::default()
        };
        let opts = cfg.render_options();
        assert_eq!(opts.target_base_url, "http://localhost:3000");
        assert_eq!(opts.wait_timeout, Duration::from_secs(7));
        assert!(opts.return_unfinished_pages);
        assert!(opts.remove_scripts);
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, PrerenderError::Config(_)), "{err}");
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn load_reads_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prerender.toml");
        fs::write(&path, "wait = \"250ms\"\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.wait, Duration::from_millis(250));
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.target, Config::default().target);
    }
}
