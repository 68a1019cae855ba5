use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize)]
pub struct Config {
    /// Root for `jsons/`, `temp/` and `logs/`. Defaults to the config file's directory.
    pub working_dir: Option<PathBuf>,

    /// How many delivered post ids are remembered per feed.
    #[serde(default = "default_max_ids")]
    pub max_ids: usize,
    /// Run one pass over all feeds and exit.
    #[serde(default)]
    pub single_start: bool,
    /// Pause between polling cycles, in seconds.
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
    #[serde(default = "default_logfile")]
    pub logfile: String,
    /// Total attempts per outbound message when the connection drops.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    pub telegram: TelegramConfig,
    pub vk: VkConfig,
    pub feeds: Vec<FeedConfig>,
}

#[derive(Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// Separate bot for the admin log channel. Falls back to `token`.
    pub log_token: Option<String>,
    /// Channel that mirrors feed log lines. Disabled when absent.
    pub log_channel: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct VkConfig {
    pub token: String,
    #[serde(default = "default_vk_version")]
    pub version: String,
}

/// One source wall relayed to one channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Short name, e.g. `en`. Also names the state file.
    pub name: String,
    /// VK wall domain.
    pub domain: String,
    /// Telegram chat id or `@channel`.
    pub channel: String,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_true")]
    pub skip_ads: bool,
    #[serde(default)]
    pub skip_copyrighted: bool,
    /// Posts containing any of these words are dropped.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// When non-empty, posts must contain at least one of these words.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl FeedConfig {
    pub fn state_file(&self) -> String {
        format!("{}.json", self.name)
    }
}

/// Fixed waits imposed by upstream rate limits.
#[derive(Clone, Debug)]
pub struct Pacing {
    pub retry_backoff: Duration,
    pub between_messages: Duration,
    pub after_video_lookup: Duration,
    pub before_log_forward: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(3),
            between_messages: Duration::from_secs(1),
            after_video_lookup: Duration::from_secs(2),
            before_log_forward: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            retry_backoff: Duration::ZERO,
            between_messages: Duration::ZERO,
            after_video_lookup: Duration::ZERO,
            before_log_forward: Duration::ZERO,
        }
    }
}

fn default_max_ids() -> usize {
    100
}
fn default_sleep_secs() -> u64 {
    600
}
fn default_logfile() -> String {
    "logs.log".into()
}
fn default_max_send_attempts() -> u32 {
    2
}
fn default_vk_version() -> String {
    "5.131".into()
}
fn default_filter() -> String {
    "all".into()
}
fn default_count() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let cfg = String::from_utf8_lossy(&bytes);
        let cfg = Self::parse(&cfg)?;

        Ok(cfg)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(Error::Config("no feeds configured".into()));
        }
        if self.max_ids == 0 {
            return Err(Error::Config("max_ids must be positive".into()));
        }
        if self.max_send_attempts == 0 {
            return Err(Error::Config("max_send_attempts must be positive".into()));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.is_empty() || feed.domain.is_empty() || feed.channel.is_empty() {
                return Err(Error::Config(format!(
                    "feed `{}` needs name, domain and channel",
                    feed.name
                )));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(Error::Config(format!("duplicate feed name `{}`", feed.name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [telegram]
        token = "tg"

        [vk]
        token = "vk"

        [[feeds]]
        name = "en"
        domain = "club_en"
        channel = "@club_en"
    "#;

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::parse(MINIMAL).unwrap();

        assert_eq!(cfg.max_ids, 100);
        assert_eq!(cfg.sleep_secs, 600);
        assert_eq!(cfg.max_send_attempts, 2);
        assert!(!cfg.single_start);
        assert_eq!(cfg.vk.version, "5.131");
        assert!(cfg.telegram.log_channel.is_none());

        let feed = &cfg.feeds[0];
        assert_eq!(feed.filter, "all");
        assert_eq!(feed.count, 10);
        assert!(feed.skip_ads);
        assert!(!feed.skip_copyrighted);
        assert!(feed.blacklist.is_empty());
        assert_eq!(feed.state_file(), "en.json");
    }

    #[test]
    fn test_word_lists_parsed() {
        let text = format!(
            "{MINIMAL}\nblacklist = [\"casino\"]\nwhitelist = [\"rust\", \"cargo\"]\n"
        );
        let cfg = Config::parse(&text).unwrap();

        assert_eq!(cfg.feeds[0].blacklist, vec!["casino"]);
        assert_eq!(cfg.feeds[0].whitelist, vec!["rust", "cargo"]);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let text = format!(
            "{MINIMAL}\n[[feeds]]\nname = \"en\"\ndomain = \"other\"\nchannel = \"@other\"\n"
        );

        assert!(matches!(Config::parse(&text), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_no_feeds() {
        let text = "feeds = []\n[telegram]\ntoken = \"tg\"\n[vk]\ntoken = \"vk\"\n";

        assert!(matches!(Config::parse(text), Err(Error::Config(_))));
    }
}
