use std::time::Duration;

use reqwest::blocking::Client;
use serde::{de::DeserializeOwned, Deserialize};

use super::{FeedSource, RawPost};
use crate::{
    config::FeedConfig,
    error::{Error, Result},
};

const API_BASE: &str = "https://api.vk.com/method";
/// Upper bound for a single `wall.get` round trip.
const WALL_TIMEOUT: Duration = Duration::from_secs(20);

pub struct VkClient {
    /// VK access token
    pub token: String,
    /// API version, e.g. `5.131`
    pub version: String,
    client: Client,
}

#[derive(Deserialize)]
struct VkEnvelope<T> {
    response: Option<T>,
    error: Option<VkApiError>,
}
#[derive(Deserialize)]
struct VkApiError {
    error_code: i64,
    error_msg: String,
}
#[derive(Deserialize)]
struct VkWall {
    items: Vec<RawPost>,
}
#[derive(Deserialize)]
struct VkVideos {
    items: Vec<VkVideo>,
}
#[derive(Deserialize)]
struct VkVideo {
    files: Option<VkVideoFiles>,
}
#[derive(Deserialize)]
struct VkVideoFiles {
    external: Option<String>,
}
#[derive(Deserialize)]
struct VkGroup {
    name: String,
}

impl VkClient {
    pub fn new(token: String, version: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vkrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self { token, version, client })
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut req = self
            .client
            .get(format!("{}/{}", API_BASE, method))
            .query(&[("access_token", self.token.as_str()), ("v", self.version.as_str())])
            .query(params);

        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let body = req.send()?.error_for_status()?.text()?;
        let envelope: VkEnvelope<T> = serde_json::from_str(&body)?;

        match (envelope.response, envelope.error) {
            (Some(response), _) => Ok(response),
            (None, Some(err)) => Err(Error::Vk { code: err.error_code, message: err.error_msg }),
            (None, None) => Err(Error::MissingData(format!("{method}: empty response"))),
        }
    }
}

impl FeedSource for VkClient {
    fn fetch_posts(&self, feed: &FeedConfig) -> Result<Vec<RawPost>> {
        let wall: VkWall = self.call(
            "wall.get",
            &[
                ("domain", feed.domain.clone()),
                ("filter", feed.filter.clone()),
                ("count", feed.count.to_string()),
            ],
            Some(WALL_TIMEOUT),
        )?;

        Ok(wall.items)
    }

    fn video_url(&self, owner_id: i64, video_id: i64, access_key: &str) -> Result<Option<String>> {
        let videos: VkVideos = self.call(
            "video.get",
            &[("videos", format!("{owner_id}_{video_id}_{access_key}"))],
            None,
        )?;

        Ok(videos
            .items
            .into_iter()
            .next()
            .and_then(|v| v.files)
            .and_then(|f| f.external))
    }

    fn group_name(&self, group_id: i64) -> Result<String> {
        let groups: Vec<VkGroup> =
            self.call("groups.getById", &[("group_id", group_id.to_string())], None)?;

        groups
            .into_iter()
            .next()
            .map(|g| g.name)
            .ok_or_else(|| Error::MissingData(format!("group {group_id} not found")))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.client.get(url).send()?.error_for_status()?.bytes()?;

        Ok(bytes.to_vec())
    }
}
