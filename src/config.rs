use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Scope, TokenSettings};
use crate::gateway::{BaseUrlResolver, NamedEnvironment, PageLocation, PRODUCTION_ORIGIN};

/// Redamancy storage client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Static API base URL (used when no environment is selected)
    #[arg(short = 'u', long, env = "REDAMANCY_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Named environment (local, prod)
    #[arg(short = 'e', long, env = "REDAMANCY_ENV")]
    pub environment: Option<String>,

    /// Hostname the client is served from, for the derived base URL
    #[arg(long, env = "REDAMANCY_PAGE_HOST", default_value = "localhost")]
    pub page_host: String,

    /// Port the client is served from
    #[arg(long, env = "REDAMANCY_PAGE_PORT")]
    pub page_port: Option<u16>,

    /// Production domain recognised by the derived base URL
    #[arg(long, env = "REDAMANCY_PRODUCTION_DOMAIN", default_value = "redamancy.com.cn")]
    pub production_domain: String,

    /// Path of the credentials file
    #[arg(short = 'c', long, env = "REDAMANCY_CREDENTIALS_FILE")]
    pub credentials_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "300")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the full URL for an endpoint
    Url { endpoint: String },

    /// GET an endpoint and print the response body
    Get { endpoint: String },

    /// Log in and store the issued tokens
    Login {
        #[arg(short = 'n', long)]
        username: Option<String>,
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// Log out and clear stored tokens
    Logout,

    /// Refresh the tokens of a scope
    Refresh { scope: Scope },

    /// Ask the backend whether the tokens of a scope are valid
    Validate { scope: Scope },

    /// Print a valid access token, refreshing it if needed
    Token { scope: Scope },

    /// Keep tokens renewed until interrupted
    Watch,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Base URL resolution
    pub api_base_url: Option<String>,
    pub environment: Option<String>,
    pub page_host: String,
    pub page_port: Option<u16>,
    pub production_domain: String,

    // Credentials
    pub credentials_file: PathBuf,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Token lifecycle
    pub token_refresh_skew: i64,
    pub token_check_interval: u64,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            environment: None,
            page_host: "localhost".to_string(),
            page_port: None,
            production_domain: "redamancy.com.cn".to_string(),
            credentials_file: default_credentials_file(),
            http_connect_timeout: 30,
            http_request_timeout: 300,
            token_refresh_skew: 60,
            token_check_interval: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Build configuration with priority: CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Self {
        let defaults = Config::default();

        Config {
            api_base_url: args.api_base_url.clone().filter(|url| !url.is_empty()),
            environment: args.environment.clone().filter(|env| !env.is_empty()),
            page_host: args.page_host.clone(),
            page_port: args.page_port,
            production_domain: args.production_domain.clone(),

            credentials_file: args
                .credentials_file
                .as_deref()
                .map(expand_tilde)
                .unwrap_or(defaults.credentials_file),

            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", defaults.http_connect_timeout),
            http_request_timeout: args.http_timeout,

            token_refresh_skew: env_or("TOKEN_REFRESH_SKEW", defaults.token_refresh_skew),
            token_check_interval: env_or("TOKEN_CHECK_INTERVAL", defaults.token_check_interval),

            log_level: args.log_level.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.environment {
            if NamedEnvironment::preset(name).is_none() {
                anyhow::bail!(
                    "Unknown environment '{}', expected one of: {}",
                    name,
                    NamedEnvironment::names().join(", ")
                );
            }
        }

        if let Some(url) = &self.api_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("REDAMANCY_API_BASE_URL must be an http(s) URL: {}", url);
            }
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if self.token_check_interval == 0 {
            anyhow::bail!("TOKEN_CHECK_INTERVAL must be greater than zero");
        }

        if self.token_refresh_skew < 0 {
            anyhow::bail!("TOKEN_REFRESH_SKEW cannot be negative");
        }

        Ok(())
    }

    /// Base URL resolver for this configuration
    pub fn resolver(&self) -> BaseUrlResolver {
        let mut resolver = BaseUrlResolver::new(PageLocation::new(&self.page_host, self.page_port))
            .with_production(&self.production_domain, PRODUCTION_ORIGIN);

        if let Some(environment) = self.environment.as_deref().and_then(NamedEnvironment::preset) {
            resolver = resolver.with_environment(Arc::new(environment));
        }
        if let Some(url) = &self.api_base_url {
            resolver = resolver.with_static_base_url(url);
        }

        resolver
    }

    pub fn token_settings(&self) -> TokenSettings {
        let skew = chrono::Duration::seconds(self.token_refresh_skew);
        TokenSettings {
            user_skew: skew,
            admin_skew: skew,
            check_interval: Duration::from_secs(self.token_check_interval),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Default location of the credentials file
fn default_credentials_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("redamancy")
        .join("credentials.json")
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        let mut argv = vec!["redamancy-client"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_subcommand_parsing() {
        let args = parse(&["refresh", "admin"]);
        assert!(matches!(args.command, Command::Refresh { scope: Scope::Admin }));

        let args = parse(&["--environment", "prod", "get", "/api/files"]);
        assert_eq!(args.environment.as_deref(), Some("prod"));
        assert!(matches!(args.command, Command::Get { ref endpoint } if endpoint == "/api/files"));

        assert!(CliArgs::try_parse_from(["redamancy-client", "token", "root"]).is_err());
    }

    #[test]
    fn test_from_args() {
        let args = parse(&[
            "--api-base-url",
            "https://files.test",
            "--page-port",
            "3000",
            "--credentials-file",
            "/tmp/creds.json",
            "watch",
        ]);
        let config = Config::from_args(&args);
        assert_eq!(config.api_base_url.as_deref(), Some("https://files.test"));
        assert_eq!(config.page_port, Some(3000));
        assert_eq!(config.credentials_file, PathBuf::from("/tmp/creds.json"));
        assert!(config.validate().is_ok());
        assert_eq!(config.resolver().resolve(), "https://files.test");
    }

    #[test]
    fn test_validate_rejects_unknown_environment() {
        let config = Config {
            environment: Some("staging".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_base_url() {
        let config = Config {
            api_base_url: Some("files.test".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_beats_static_url() {
        let config = Config {
            environment: Some("local".to_string()),
            api_base_url: Some("https://files.test".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolver().resolve(), "http://localhost:8080");
    }

    #[test]
    fn test_derived_resolution_from_page() {
        let config = Config {
            page_host: "www.redamancy.com.cn".to_string(),
            ..Config::default()
        };
        assert_eq!(config.resolver().resolve(), "https://redamancy.com.cn");
    }

    #[test]
    fn test_token_settings() {
        let settings = Config::default().token_settings();
        assert_eq!(settings.user_skew, chrono::Duration::seconds(60));
        assert_eq!(settings.admin_skew, chrono::Duration::seconds(60));
        assert_eq!(settings.check_interval, Duration::from_secs(60));
    }
}
