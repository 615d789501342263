//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [scheduler]
//! consecutive_down_threshold = 3
//! cooldown_secs = 1800
//! default_probe_timeout_ms = 10000
//!
//! [[webhook]]
//! url = "https://hooks.example.com/sitewatch"
//! secret = "signing-key"
//!
//! [[site]]
//! id = "shop"
//! name = "Shop frontend"
//! url = "https://shop.example.com/health"
//! interval_secs = 30
//! owner_email = "ops@example.com"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use sitewatch_core::{is_valid_url, SchedulerConfig, Site, WebhookConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,

    #[serde(default)]
    pub site: Vec<Site>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
        }
    }
}

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Overrides for [`SchedulerConfig`]; unset fields keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerSection {
    pub default_probe_timeout_ms: Option<u64>,
    pub consecutive_down_threshold: Option<usize>,
    pub cooldown_secs: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
    pub fallback_interval_secs: Option<u64>,
    pub sweep_concurrency: Option<usize>,
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let mut c = SchedulerConfig::default();
        if let Some(v) = self.default_probe_timeout_ms {
            c = c.with_default_probe_timeout(Duration::from_millis(v));
        }
        if let Some(v) = self.consecutive_down_threshold {
            c = c.with_consecutive_down_threshold(v);
        }
        if let Some(v) = self.cooldown_secs {
            c = c.with_cooldown(Duration::from_secs(v));
        }
        if let Some(v) = self.cancel_grace_ms {
            c = c.with_cancel_grace(Duration::from_millis(v));
        }
        if let Some(v) = self.fallback_interval_secs {
            c = c.with_fallback_interval(Duration::from_secs(v));
        }
        if let Some(v) = self.sweep_concurrency {
            c = c.with_sweep_concurrency(v);
        }
        c
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        for (i, wh) in self.webhook.iter().enumerate() {
            url::Url::parse(&wh.url)
                .map_err(|e| format!("Invalid webhook URL at index {}: {} ({})", i, wh.url, e))?;
        }

        if self.scheduler.consecutive_down_threshold == Some(0) {
            return Err("consecutive_down_threshold must be at least 1".into());
        }
        if self.scheduler.sweep_concurrency == Some(0) {
            return Err("sweep_concurrency must be at least 1".into());
        }

        let mut site_ids = HashSet::new();
        for s in &self.site {
            if s.id.as_str().trim().is_empty() {
                return Err("Site ID must not be empty".into());
            }
            if !site_ids.insert(&s.id) {
                return Err(format!("Duplicate site ID: {}", s.id));
            }
            if !is_valid_url(&s.url) {
                return Err(format!(
                    "Site URL must use http or https and name a host in site '{}': {}",
                    s.id, s.url
                ));
            }
            if s.interval_secs == 0 {
                return Err(format!("Site '{}' has a zero interval_secs", s.id));
            }
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[[site]]
id = "shop"
url = "https://shop.example.com"
interval_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.site.len(), 1);
        assert_eq!(config.site[0].id.as_str(), "shop");
        assert!(config.site[0].active);
        assert_eq!(config.site[0].owner_email, None);
        assert_eq!(config.server.log_format, "pretty");
        assert_eq!(config.server.listen, default_listen());

        let sched = config.scheduler.to_scheduler_config();
        assert_eq!(sched.consecutive_down_threshold, 3);
        assert_eq!(sched.cooldown, Duration::from_secs(1800));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
listen = "127.0.0.1:9090"
log_format = "json"

[scheduler]
default_probe_timeout_ms = 4000
consecutive_down_threshold = 5
cooldown_secs = 600
cancel_grace_ms = 2000
sweep_concurrency = 2

[[webhook]]
url = "https://hooks.example.com/alerts"
secret = "my-key"

[[site]]
id = "shop"
name = "Shop"
url = "https://shop.example.com"
interval_secs = 30
owner_email = "ops@example.com"
timeout_ms = 2500

[[site]]
id = "blog"
url = "http://blog.example.com"
interval_secs = 300
active = false
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.log_format, "json");
        assert_eq!(config.webhook.len(), 1);
        assert_eq!(config.webhook[0].secret.as_deref(), Some("my-key"));
        assert_eq!(config.webhook[0].timeout_ms, 5000); // default

        let sched = config.scheduler.to_scheduler_config();
        assert_eq!(sched.default_probe_timeout, Duration::from_secs(4));
        assert_eq!(sched.consecutive_down_threshold, 5);
        assert_eq!(sched.cooldown, Duration::from_secs(600));
        assert_eq!(sched.cancel_grace, Duration::from_secs(2));
        assert_eq!(sched.sweep_concurrency, 2);
        assert_eq!(sched.fallback_interval, Duration::from_secs(60));

        assert_eq!(config.site.len(), 2);
        assert_eq!(config.site[0].label(), "Shop");
        assert_eq!(config.site[0].recipient(), Some("ops@example.com"));
        assert_eq!(config.site[0].timeout_ms, Some(2500));
        assert!(!config.site[1].active);
    }

    #[test]
    fn validate_rejects_duplicate_site_ids() {
        let toml = r#"
[[site]]
id = "same"
url = "https://a.example.com"
interval_secs = 60

[[site]]
id = "same"
url = "https://b.example.com"
interval_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Duplicate site ID"), "{}", err);
    }

    #[test]
    fn validate_rejects_empty_site_id() {
        let toml = r#"
[[site]]
id = ""
url = "https://a.example.com"
interval_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("must not be empty"), "{}", err);
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let toml = r#"
[[site]]
id = "ftp"
url = "ftp://files.example.com"
interval_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("http or https"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let toml = r#"
[[site]]
id = "fast"
url = "https://a.example.com"
interval_secs = 0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("zero interval_secs"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let toml = r#"
[scheduler]
consecutive_down_threshold = 0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("at least 1"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_webhook_url() {
        let toml = r#"
[[webhook]]
url = "not-valid"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid webhook URL"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let toml = r#"
[server]
log_format = "xml"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_format"), "{}", err);
    }
}
