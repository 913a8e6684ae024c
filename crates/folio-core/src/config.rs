//! Site configuration

use crate::error::{SiteError, SiteResult};
use crate::types::Quote;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Top-level site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin the site is served from
    pub origin: String,

    /// Offline cache worker settings
    pub worker: WorkerConfig,

    /// Page controller settings
    pub page: PageConfig,
}

/// Offline cache worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Root-relative path of the worker script
    pub script_path: String,

    /// Cache generation identifier, bumped on every deployment
    pub generation: String,

    /// URLs fetched and stored at install time
    pub precache: Vec<String>,

    /// Surface caught worker errors in the log
    pub debug: bool,
}

/// Page controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Theme used when nothing is stored yet ("dark" or "light")
    pub default_theme: String,

    /// File backing the persistent key-value store, in-memory when unset
    pub storage_path: Option<PathBuf>,

    /// Avatar images cycled in the sidebar
    pub avatar_images: Vec<String>,

    /// Seconds between avatar changes
    pub avatar_interval_secs: u64,

    /// Milliseconds the avatar stays faded out before the swap
    pub avatar_fade_ms: u64,

    /// Seconds between testimonial shuffles
    pub testimonial_shuffle_secs: u64,

    /// Milliseconds the testimonial list stays faded out while reordering
    pub testimonial_fade_ms: u64,

    /// Endpoint returning `[{"q": .., "a": ..}]`
    pub quote_api: String,

    /// Seconds between quote refreshes
    pub quote_interval_secs: u64,

    /// Quotes used when the quote endpoint is unreachable
    pub fallback_quotes: Vec<Quote>,

    /// External form-handling endpoint for the contact form
    pub form_action: Option<String>,

    /// Seconds the contact form status stays visible
    pub form_status_secs: u64,

    /// Year the experience counter starts from
    pub experience_start_year: i32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://waqar.eu".to_string(),
            worker: WorkerConfig::default(),
            page: PageConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            script_path: "/sw.js".to_string(),
            generation: "waqar-portfolio-v7".to_string(),
            precache: [
                "/",
                "/index.html",
                "/404.html",
                "/assets/css/style.min.css",
                "/assets/js/script.min.js",
                "/assets/images/my-avatar.webp",
                "/assets/images/my-avatar-3.webp",
                "/assets/images/logo.ico",
                "/assets/images/avatar-1.webp",
                "/assets/images/avatar-2.webp",
                "/assets/images/avatar-3.webp",
                "/assets/images/avatar-4.webp",
                "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600&display=swap",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            debug: false,
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_theme: "dark".to_string(),
            storage_path: None,
            avatar_images: vec![
                "./assets/images/my-avatar.webp".to_string(),
                "./assets/images/my-avatar-1.webp".to_string(),
            ],
            avatar_interval_secs: 10,
            avatar_fade_ms: 2000,
            testimonial_shuffle_secs: 30,
            testimonial_fade_ms: 500,
            quote_api: "https://zenquotes.io/api/random".to_string(),
            quote_interval_secs: 120,
            fallback_quotes: default_quotes(),
            form_action: None,
            form_status_secs: 5,
            experience_start_year: 2015,
        }
    }
}

fn default_quotes() -> Vec<Quote> {
    vec![
        Quote::new("The only way to do great work is to love what you do.", "Steve Jobs"),
        Quote::new("Innovation distinguishes between a leader and a follower.", "Steve Jobs"),
        Quote::new("Code is like humor. When you have to explain it, it's bad.", "Cory House"),
        Quote::new("First, solve the problem. Then, write the code.", "John Johnson"),
        Quote::new("The best way to predict the future is to invent it.", "Alan Kay"),
        Quote::new("Make it work, make it right, make it fast.", "Kent Beck"),
        Quote::new("Simplicity is the soul of efficiency.", "Austin Freeman"),
        Quote::new("Quality is not an act, it is a habit.", "Aristotle"),
        Quote::new("Talk is cheap. Show me the code.", "Linus Torvalds"),
        Quote::new(
            "Perfection is achieved not when there is nothing more to add, but when there is nothing left to take away.",
            "Antoine de Saint-Exupéry",
        ),
    ]
}

impl SiteConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> SiteResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> SiteResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading site configuration");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parsed site origin
    pub fn origin_url(&self) -> SiteResult<Url> {
        Ok(Url::parse(&self.origin)?)
    }

    /// Absolute URL of the worker script
    pub fn script_url(&self) -> SiteResult<Url> {
        Ok(self.origin_url()?.join(&self.worker.script_path)?)
    }

    /// Check the invariants the worker relies on
    pub fn validate(&self) -> SiteResult<()> {
        let origin = self.origin_url()?;

        if self.worker.generation.trim().is_empty() {
            return Err(SiteError::config("cache generation must not be empty"));
        }

        for entry in &self.worker.precache {
            origin.join(entry).map_err(|e| {
                SiteError::config(format!("invalid precache entry {entry:?}: {e}"))
            })?;
        }

        match self.page.default_theme.as_str() {
            "dark" | "light" => {}
            other => {
                return Err(SiteError::config(format!("unknown default theme {other:?}")));
            }
        }

        if let Some(ref action) = self.page.form_action {
            Url::parse(action)
                .map_err(|e| SiteError::config(format!("invalid form action {action:?}: {e}")))?;
        }

        Ok(())
    }
}

impl PageConfig {
    pub fn avatar_interval(&self) -> Duration {
        Duration::from_secs(self.avatar_interval_secs)
    }

    pub fn avatar_fade(&self) -> Duration {
        Duration::from_millis(self.avatar_fade_ms)
    }

    pub fn testimonial_interval(&self) -> Duration {
        Duration::from_secs(self.testimonial_shuffle_secs)
    }

    pub fn testimonial_fade(&self) -> Duration {
        Duration::from_millis(self.testimonial_fade_ms)
    }

    pub fn quote_interval(&self) -> Duration {
        Duration::from_secs(self.quote_interval_secs)
    }

    pub fn form_status_duration(&self) -> Duration {
        Duration::from_secs(self.form_status_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SiteConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.precache.len(), 13);
        assert_eq!(config.page.default_theme, "dark");
        assert_eq!(config.page.fallback_quotes.len(), 10);
    }

    #[test]
    fn test_script_url_resolves_against_origin() {
        let config = SiteConfig::default();
        assert_eq!(config.script_url().unwrap().as_str(), "https://waqar.eu/sw.js");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SiteConfig::from_json(
            r#"{ "origin": "https://example.com", "worker": { "generation": "v8" } }"#,
        )
        .unwrap();

        assert_eq!(config.worker.generation, "v8");
        assert_eq!(config.worker.script_path, "/sw.js");
        assert_eq!(config.page.avatar_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_generation_rejected() {
        let result = SiteConfig::from_json(r#"{ "worker": { "generation": "  " } }"#);
        assert!(matches!(result, Err(SiteError::Config(_))));
    }

    #[test]
    fn test_unknown_theme_rejected() {
        let result = SiteConfig::from_json(r#"{ "page": { "default_theme": "sepia" } }"#);
        assert!(matches!(result, Err(SiteError::Config(_))));
    }

    #[test]
    fn test_bad_origin_rejected() {
        let result = SiteConfig::from_json(r#"{ "origin": "not a url" }"#);
        assert!(matches!(result, Err(SiteError::Url(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "worker": {{ "generation": "v9", "precache": ["/"], "debug": true }} }}"#
        )
        .unwrap();

        let config = SiteConfig::load(file.path()).unwrap();
        assert_eq!(config.worker.generation, "v9");
        assert_eq!(config.worker.precache, vec!["/".to_string()]);
        assert!(config.worker.debug);
    }
}
