use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Run-wide settings for the orchestrator, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum number of candidates requested from the source per run.
    pub batch_limit: usize,
    /// Directory holding the in-flight media file.
    pub work_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_limit: 5,
            work_dir: PathBuf::from("./tmp"),
            ledger_path: PathBuf::from("posted_cache.json"),
        }
    }
}

impl RelayConfig {
    pub fn trace_loaded(&self) {
        info!(
            batch_limit = self.batch_limit,
            work_dir = %self.work_dir.display(),
            ledger_path = %self.ledger_path.display(),
            "Loaded RelayConfig"
        );
        debug!(?self, "RelayConfig loaded (full debug)");
    }
}

/// Bounded retry for downloads: `retries` extra attempts after the first,
/// a fixed `backoff_secs` pause between attempts, and a per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff_secs: 3,
            timeout_secs: 120,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Whether an empty caption is still sent as a `description` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPolicy {
    #[default]
    Always,
    OmitWhenEmpty,
}

impl CaptionPolicy {
    /// The description to send for `caption`, if any.
    pub fn apply<'a>(&self, caption: &'a str) -> Option<&'a str> {
        match self {
            CaptionPolicy::Always => Some(caption),
            CaptionPolicy::OmitWhenEmpty if caption.trim().is_empty() => None,
            CaptionPolicy::OmitWhenEmpty => Some(caption),
        }
    }
}

/// Destination-side publishing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPolicy {
    pub graph_url: String,
    pub graph_version: String,
    pub timeout_secs: u64,
    pub caption: CaptionPolicy,
    pub published: bool,
    /// Sent as `{"value":"<privacy>"}`; `None` leaves the page default.
    pub privacy: Option<String>,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            graph_url: "https://graph.facebook.com".to_string(),
            graph_version: "v21.0".to_string(),
            timeout_secs: 300,
            caption: CaptionPolicy::Always,
            published: true,
            privacy: Some("EVERYONE".to_string()),
        }
    }
}

impl PublishPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            graph_version = %self.graph_version,
            caption = ?self.caption,
            published = self.published,
            privacy = self.privacy.as_deref().unwrap_or("<page default>"),
            "Loaded PublishPolicy"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_defaults_match_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Duration::from_secs(3));
        assert_eq!(policy.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn caption_policy_omits_only_blank_captions() {
        assert_eq!(CaptionPolicy::Always.apply(""), Some(""));
        assert_eq!(CaptionPolicy::OmitWhenEmpty.apply("  "), None);
        assert_eq!(CaptionPolicy::OmitWhenEmpty.apply("hi"), Some("hi"));
    }

    #[test]
    fn partial_publish_section_keeps_other_defaults() {
        let policy: PublishPolicy =
            serde_json::from_str(r#"{"caption":"omit_when_empty","privacy":null}"#).unwrap();
        assert_eq!(policy.caption, CaptionPolicy::OmitWhenEmpty);
        assert_eq!(policy.privacy, None);
        assert!(policy.published);
        assert_eq!(policy.graph_version, "v21.0");
    }
}
