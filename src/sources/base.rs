use serde::Deserialize;

use crate::{config::FeedConfig, error::Result};

/// Wall post as returned by `wall.get`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPost {
    pub id: i64,
    #[serde(default)]
    pub owner_id: i64,
    #[serde(default)]
    pub from_id: i64,
    /// Post text. May be empty string if not exists.
    #[serde(default)]
    pub text: String,
    /// `1` when the post is marked as an advertisement.
    #[serde(default)]
    pub marked_as_ads: i64,
    #[serde(default)]
    pub copyright: Option<serde_json::Value>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Reposted posts, outermost first. Only the first one is relayed.
    #[serde(default)]
    pub copy_history: Vec<RawPost>,
}

impl RawPost {
    pub fn is_ad(&self) -> bool {
        self.marked_as_ads == 1
    }

    pub fn has_copyright(&self) -> bool {
        self.copyright.is_some()
    }

    pub fn repost(&self) -> Option<&RawPost> {
        self.copy_history.first()
    }

    /// Public link to this post, `https://vk.com/wall<from>_<id>`.
    pub fn url(&self) -> String {
        format!("https://vk.com/wall{}_{}", self.from_id, self.id)
    }
}

/// Post attachment.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "RawAttachment")]
pub enum Attachment {
    Link(LinkAttachment),
    Video(VideoAttachment),
    Photo(PhotoAttachment),
    Document(DocumentAttachment),
    /// Known type whose payload was absent or unreadable.
    Malformed(String),
    /// Type this relay does not handle (polls, audio, ...).
    Unsupported(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct LinkAttachment {
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VideoAttachment {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub access_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PhotoAttachment {
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PhotoSize {
    pub r#type: String,
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DocumentAttachment {
    pub title: String,
    pub size: u64,
    pub r#type: i64,
    pub url: String,
}

/// VK puts the payload under a key named after the type.
#[derive(Deserialize)]
struct RawAttachment {
    r#type: String,
    #[serde(flatten)]
    payloads: serde_json::Map<String, serde_json::Value>,
}

impl From<RawAttachment> for Attachment {
    fn from(mut raw: RawAttachment) -> Self {
        let key = match raw.r#type.as_str() {
            "link" => "link",
            "video" => "video",
            "photo" => "photo",
            "doc" => "doc",
            _ => return Attachment::Unsupported(raw.r#type),
        };

        let payload = match raw.payloads.remove(key) {
            Some(p) => p,
            None => return Attachment::Malformed(raw.r#type),
        };

        let parsed = match key {
            "link" => serde_json::from_value(payload).map(Attachment::Link),
            "video" => serde_json::from_value(payload).map(Attachment::Video),
            "photo" => serde_json::from_value(payload).map(Attachment::Photo),
            _ => serde_json::from_value(payload).map(Attachment::Document),
        };

        parsed.unwrap_or(Attachment::Malformed(raw.r#type))
    }
}

/// Everything the relay reads from the source network.
pub trait FeedSource {
    /// Latest posts of the feed's wall, in the order the API returns them.
    fn fetch_posts(&self, feed: &FeedConfig) -> Result<Vec<RawPost>>;

    /// Direct playable URL of a video, if the API exposes one.
    fn video_url(&self, owner_id: i64, video_id: i64, access_key: &str) -> Result<Option<String>>;

    /// Display name of a community.
    fn group_name(&self, group_id: i64) -> Result<String>;

    /// Raw bytes behind a media URL.
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}
