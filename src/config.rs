//! Configuration file loading.
//!
//! The relay reads a single YAML document:
//!
//! ```yaml
//! irc:
//!   nick: feedrelay
//!   server: irc.libera.chat:6697
//!   channels: ["#rust-feeds"]
//! feeds:
//!   endpoints: ["/r/rust/new"]
//!   user_agent: "linux:feedrelay:0.1 (by /u/someone)"
//! timing:
//!   interval_secs: 300
//! ```
//!
//! Everything except the nick, server, channels, endpoints and user agent has
//! a default.  A few settings can also be overridden from the command line
//! through [`Overrides`]; overrides are applied before validation.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Command line settings that take precedence over the file.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Replace the configured feed endpoints (repeatable)
    #[arg(long = "endpoint", value_name = "PATH")]
    pub endpoints: Vec<String>,
    /// Replace the configured IRC channels (repeatable)
    #[arg(long = "channel", value_name = "CHANNEL")]
    pub channels: Vec<String>,
    /// Seconds between cycles
    #[arg(long)]
    pub interval_secs: Option<u64>,
    /// Align the first cycle to a multiple of this many seconds
    #[arg(long)]
    pub round_secs: Option<u64>,
    /// Include the endpoint in relayed messages
    #[arg(long)]
    pub print_endpoint: bool,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if !self.endpoints.is_empty() {
            config.feeds.endpoints = self.endpoints.clone();
        }
        if !self.channels.is_empty() {
            config.irc.channels = self.channels.clone();
        }
        if let Some(secs) = self.interval_secs {
            config.timing.interval_secs = secs;
        }
        if let Some(secs) = self.round_secs {
            config.timing.round_secs = secs;
        }
        if self.print_endpoint {
            config.feeds.print_endpoint = true;
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub irc: IrcConfig,
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IrcConfig {
    pub nick: String,
    /// Username sent at registration; defaults to the nick.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// `host[:port]`.
    pub server: String,
    #[serde(default = "default_true")]
    pub tls: bool,
    pub channels: Vec<String>,
}

impl IrcConfig {
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.nick)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    pub endpoints: Vec<String>,
    pub user_agent: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_permalink_base")]
    pub permalink_base: String,
    /// Include the endpoint an item was found on in the relayed message.
    #[serde(default)]
    pub print_endpoint: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub interval_secs: u64,
    /// First cycle starts on a multiple of this many seconds since the epoch.
    pub round_secs: u64,
    pub queue_capacity: usize,
    pub send_delay_ms: u64,
    pub reconnect_cooldown_secs: u64,
    pub bootstrap_backoff_secs: u64,
    /// Whole-request limit for a single feed fetch.
    pub fetch_timeout_secs: u64,
    /// Limit for connecting and registering with the IRC server.
    pub connect_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            round_secs: 300,
            queue_capacity: 100,
            send_delay_ms: 1000,
            reconnect_cooldown_secs: 60,
            bootstrap_backoff_secs: 600,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn round(&self) -> Duration {
        Duration::from_secs(self.round_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.reconnect_cooldown_secs)
    }

    pub fn bootstrap_backoff(&self) -> Duration {
        Duration::from_secs(self.bootstrap_backoff_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_permalink_base() -> String {
    "https://redd.it/".to_string()
}

impl Config {
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse_with(&content, overrides)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    #[cfg(test)]
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_with(content, &Overrides::default())
    }

    pub fn parse_with(content: &str, overrides: &Overrides) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.irc.nick.trim().is_empty() {
            bail!("irc.nick must not be empty");
        }
        if self.irc.server.trim().is_empty() {
            bail!("irc.server must not be empty");
        }
        if self.irc.channels.is_empty() {
            bail!("irc.channels must list at least one channel");
        }
        if self.feeds.endpoints.is_empty() {
            bail!("feeds.endpoints must list at least one endpoint");
        }
        if self.feeds.user_agent.trim().is_empty() {
            bail!("feeds.user_agent must not be empty");
        }

        let t = &self.timing;
        for (name, value) in [
            ("interval_secs", t.interval_secs),
            ("round_secs", t.round_secs),
            ("queue_capacity", t.queue_capacity as u64),
            ("send_delay_ms", t.send_delay_ms),
            ("reconnect_cooldown_secs", t.reconnect_cooldown_secs),
            ("bootstrap_backoff_secs", t.bootstrap_backoff_secs),
            ("fetch_timeout_secs", t.fetch_timeout_secs),
            ("connect_timeout_secs", t.connect_timeout_secs),
        ] {
            if value == 0 {
                bail!("timing.{name} must be greater than zero");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
irc:
  nick: relay
  server: irc.libera.chat
  channels: ["#rust"]
feeds:
  endpoints: ["/r/rust/new"]
  user_agent: "test-agent"
"##;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.irc.user(), "relay");
        assert!(config.irc.tls);
        assert!(config.irc.password.is_none());
        assert_eq!(config.feeds.base_url, "https://www.reddit.com");
        assert_eq!(config.feeds.permalink_base, "https://redd.it/");
        assert!(!config.feeds.print_endpoint);
        assert_eq!(config.timing.interval(), Duration::from_secs(300));
        assert_eq!(config.timing.round(), Duration::from_secs(300));
        assert_eq!(config.timing.queue_capacity, 100);
        assert_eq!(config.timing.send_delay(), Duration::from_secs(1));
        assert_eq!(config.timing.reconnect_cooldown(), Duration::from_secs(60));
        assert_eq!(config.timing.bootstrap_backoff(), Duration::from_secs(600));
        assert_eq!(config.timing.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.timing.connect_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn full_config_overrides_defaults() {
        let yaml = r##"
irc:
  nick: relay
  user: relayuser
  password: secret
  server: irc.example.net:6667
  tls: false
  channels: ["#a", "#b"]
feeds:
  endpoints: ["/r/rust/new", "/r/programming/new"]
  user_agent: "ua"
  print_endpoint: true
timing:
  interval_secs: 60
  send_delay_ms: 250
"##;
        let config = Config::parse(yaml).unwrap();

        assert_eq!(config.irc.user(), "relayuser");
        assert_eq!(config.irc.password.as_deref(), Some("secret"));
        assert!(!config.irc.tls);
        assert_eq!(config.irc.channels.len(), 2);
        assert!(config.feeds.print_endpoint);
        assert_eq!(config.timing.interval_secs, 60);
        assert_eq!(config.timing.send_delay(), Duration::from_millis(250));
        // Unset timing fields keep their defaults.
        assert_eq!(config.timing.round_secs, 300);
    }

    #[test]
    fn rejects_missing_channels() {
        let yaml = MINIMAL.replace(r##"channels: ["#rust"]"##, "channels: []");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("irc.channels"), "{err}");
    }

    #[test]
    fn rejects_missing_endpoints() {
        let yaml = MINIMAL.replace(r#"endpoints: ["/r/rust/new"]"#, "endpoints: []");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("feeds.endpoints"), "{err}");
    }

    #[test]
    fn rejects_zero_durations() {
        let yaml = format!("{MINIMAL}timing:\n  round_secs: 0\n");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("timing.round_secs"), "{err}");
    }

    #[test]
    fn rejects_zero_fetch_timeout() {
        let yaml = format!("{MINIMAL}timing:\n  fetch_timeout_secs: 0\n");
        let err = Config::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("timing.fetch_timeout_secs"), "{err}");
    }

    #[test]
    fn command_line_overrides_replace_file_values() {
        let overrides = Overrides {
            endpoints: vec!["/r/a".into(), "/r/b".into()],
            channels: vec!["#override".into()],
            interval_secs: Some(60),
            round_secs: None,
            print_endpoint: true,
        };
        let config = Config::parse_with(MINIMAL, &overrides).unwrap();

        assert_eq!(config.feeds.endpoints, vec!["/r/a", "/r/b"]);
        assert_eq!(config.irc.channels, vec!["#override"]);
        assert_eq!(config.timing.interval_secs, 60);
        assert_eq!(config.timing.round_secs, 300);
        assert!(config.feeds.print_endpoint);
    }

    #[test]
    fn empty_overrides_keep_file_values() {
        let config = Config::parse_with(MINIMAL, &Overrides::default()).unwrap();

        assert_eq!(config.feeds.endpoints, vec!["/r/rust/new"]);
        assert_eq!(config.irc.channels, vec!["#rust"]);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = Overrides {
            interval_secs: Some(0),
            ..Overrides::default()
        };
        let err = Config::parse_with(MINIMAL, &overrides).unwrap_err();
        assert!(err.to_string().contains("timing.interval_secs"), "{err}");
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(Config::parse("irc: [").is_err());
    }
}
