use std::{path::Path, time::Duration};

use reqwest::blocking::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};

/// Send primitives the relay needs from the destination platform.
pub trait Destination {
    /// Plain HTML message.
    fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;

    /// Photo by URL, optionally with an HTML caption.
    fn send_photo(&self, chat_id: &str, photo_url: &str, caption: Option<&str>) -> Result<()>;

    /// Album of uploaded photos. Caption goes on the first item.
    fn send_media_group(&self, chat_id: &str, photos: Vec<Vec<u8>>, caption: Option<&str>)
        -> Result<()>;

    /// Upload a local file as a document.
    fn send_document(&self, chat_id: &str, path: &Path) -> Result<()>;

    /// Succeeds when the bot can see the chat's administrators.
    fn get_chat_administrators(&self, chat_id: &str) -> Result<()>;
}

pub struct TelegramClient {
    pub token: String,
    client: Client,
}

#[derive(Serialize)]
struct TelegramInputMedia {
    r#type: String,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<String>,
}

#[derive(Deserialize)]
struct TelegramErrorResponse {
    description: String,
    error_code: u16,
}

impl TelegramClient {
    pub fn new(token: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self { token, client })
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }

    fn check(res: Response) -> Result<()> {
        if res.status().is_success() {
            return Ok(());
        }

        let status = res.status().as_u16();
        let text = res.text().unwrap_or_default();
        let tgres = serde_json::from_str(&text).unwrap_or(TelegramErrorResponse {
            error_code: status,
            description: "(vkrelay) Internal Error".into(),
        });

        Err(Error::Telegram { code: tgres.error_code, description: tgres.description })
    }
}

fn album_media(count: usize, caption: Option<&str>) -> Vec<TelegramInputMedia> {
    let mut media: Vec<TelegramInputMedia> = (0..count)
        .map(|i| TelegramInputMedia {
            r#type: "photo".into(),
            media: format!("attach://photo{i}"),
            caption: None,
            parse_mode: None,
        })
        .collect();

    if let (Some(first), Some(caption)) = (media.first_mut(), caption) {
        first.caption = Some(caption.into());
        first.parse_mode = Some("HTML".into());
    }

    media
}

impl Destination for TelegramClient {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let res = self
            .client
            .post(self.url("sendMessage"))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML"
            }))
            .send()?;

        Self::check(res)
    }

    fn send_photo(&self, chat_id: &str, photo_url: &str, caption: Option<&str>) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "photo": photo_url,
        });
        if let Some(caption) = caption {
            body["caption"] = json!(caption);
            body["parse_mode"] = json!("HTML");
        }

        let res = self.client.post(self.url("sendPhoto")).json(&body).send()?;

        Self::check(res)
    }

    fn send_media_group(
        &self,
        chat_id: &str,
        photos: Vec<Vec<u8>>,
        caption: Option<&str>,
    ) -> Result<()> {
        let media = serde_json::to_string(&album_media(photos.len(), caption))?;

        let mut form = Form::new().text("chat_id", chat_id.to_string()).text("media", media);
        for (i, bytes) in photos.into_iter().enumerate() {
            let part = Part::bytes(bytes).file_name(format!("photo{i}.jpg"));
            form = form.part(format!("photo{i}"), part);
        }

        let res = self.client.post(self.url("sendMediaGroup")).multipart(form).send()?;

        Self::check(res)
    }

    fn send_document(&self, chat_id: &str, path: &Path) -> Result<()> {
        let form = Form::new().text("chat_id", chat_id.to_string()).file("document", path)?;

        let res = self.client.post(self.url("sendDocument")).multipart(form).send()?;

        Self::check(res)
    }

    fn get_chat_administrators(&self, chat_id: &str) -> Result<()> {
        let res = self
            .client
            .get(self.url("getChatAdministrators"))
            .query(&[("chat_id", chat_id)])
            .send()?;

        Self::check(res)
    }
}
