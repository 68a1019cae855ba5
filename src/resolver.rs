use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::{Error, Result},
    logging::LogContext,
    sources::{
        Attachment, DocumentAttachment, FeedSource, LinkAttachment, PhotoAttachment,
        VideoAttachment,
    },
};

/// Photo size codes, largest first.
pub const PHOTO_SIZE_PRIORITY: [&str; 10] = ["w", "z", "y", "x", "r", "q", "p", "o", "m", "s"];
/// Documents above this many bytes are not relayed.
pub const MAX_DOCUMENT_SIZE: u64 = 50_000_000;

lazy_static! {
    static ref PHOTO_EXTRA_PARAM: Regex =
        Regex::new(r"&([a-zA-Z]+(_[a-zA-Z]+)+)=([a-zA-Z0-9_-]+)").unwrap();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Archive,
    Gif,
    Image,
    Audio,
    Video,
    Ebook,
    Unknown,
}

impl From<i64> for DocumentKind {
    fn from(code: i64) -> Self {
        match code {
            1 => DocumentKind::Text,
            2 => DocumentKind::Archive,
            3 => DocumentKind::Gif,
            4 => DocumentKind::Image,
            5 => DocumentKind::Audio,
            6 => DocumentKind::Video,
            7 => DocumentKind::Ebook,
            _ => DocumentKind::Unknown,
        }
    }
}

/// Document downloaded to scratch storage, waiting for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub kind: DocumentKind,
    pub title: String,
    pub url: String,
    pub path: PathBuf,
}

/// Attachments of one post, in discovery order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resources {
    pub links: Vec<String>,
    pub videos: Vec<String>,
    pub photos: Vec<String>,
    pub documents: Vec<Document>,
}

/// Empty the scratch directory, creating it if needed.
pub fn prepare_scratch(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(path)?;
        }
    }

    Ok(())
}

pub struct Resolver<'a> {
    source: &'a dyn FeedSource,
    scratch: &'a Path,
    video_pause: Duration,
}

impl<'a> Resolver<'a> {
    pub fn new(source: &'a dyn FeedSource, scratch: &'a Path, video_pause: Duration) -> Self {
        Self { source, scratch, video_pause }
    }

    /// Resolve every attachment of a post. `text` is the escaped post text that
    /// links are checked against. A failing attachment is logged and skipped.
    pub fn resolve(
        &self,
        post_id: i64,
        attachments: &[Attachment],
        text: &str,
        log: &LogContext,
    ) -> Resources {
        let mut res = Resources::default();

        for attachment in attachments {
            let outcome = match attachment {
                Attachment::Link(link) => {
                    res.links.extend(resolve_link(link, text));
                    Ok(())
                }
                Attachment::Video(video) => {
                    res.videos.push(self.resolve_video(video));
                    Ok(())
                }
                Attachment::Photo(photo) => resolve_photo(photo).map(|url| res.photos.push(url)),
                Attachment::Document(doc) => self
                    .resolve_document(doc, post_id, log)
                    .map(|doc| res.documents.extend(doc)),
                Attachment::Malformed(kind) => {
                    Err(Error::MissingData(format!("{kind} attachment without payload")))
                }
                Attachment::Unsupported(kind) => {
                    tracing::debug!(post_id, kind = %kind, "attachment type not relayed");
                    Ok(())
                }
            };

            if let Err(e) = outcome {
                log.error(format!("[id:{}] Failed to resolve attachment: {}", post_id, e));
            }
        }

        res
    }

    /// Direct URL when VK gives one, the watch page otherwise.
    fn resolve_video(&self, video: &VideoAttachment) -> String {
        let access_key = video.access_key.as_deref().unwrap_or_default();
        let direct = self.source.video_url(video.owner_id, video.id, access_key);

        // VK revokes tokens that query video.get too often
        thread::sleep(self.video_pause);

        match direct {
            Ok(Some(url)) => url,
            _ => format!("https://vk.com/video{}_{}", video.owner_id, video.id),
        }
    }

    fn resolve_document(
        &self,
        doc: &DocumentAttachment,
        post_id: i64,
        log: &LogContext,
    ) -> Result<Option<Document>> {
        if doc.size > MAX_DOCUMENT_SIZE {
            log.info(format!(
                "[id:{}] Document [{}] skipped because it > 50 MB",
                post_id, doc.title
            ));
            return Ok(None);
        }

        let bytes = self.source.download(&doc.url)?;
        let path = self.scratch.join(scratch_name(&doc.title));
        fs::write(&path, bytes)?;

        Ok(Some(Document {
            kind: DocumentKind::from(doc.r#type),
            title: doc.title.clone(),
            url: doc.url.clone(),
            path,
        }))
    }
}

fn resolve_link(link: &LinkAttachment, text: &str) -> Option<String> {
    if text.contains(&link.url) {
        None
    } else {
        Some(link.url.clone())
    }
}

fn resolve_photo(photo: &PhotoAttachment) -> Result<String> {
    let url = pick_photo(photo).ok_or_else(|| Error::MissingData("photo without sizes".into()))?;

    Ok(strip_photo_params(url))
}

/// URL of the largest size present, by `PHOTO_SIZE_PRIORITY`.
pub fn pick_photo(photo: &PhotoAttachment) -> Option<&str> {
    PHOTO_SIZE_PRIORITY.iter().find_map(|code| {
        photo.sizes.iter().find(|s| s.r#type == *code).map(|s| s.url.as_str())
    })
}

/// Drop `&snake_case_key=value` parameters from a photo URL.
pub fn strip_photo_params(url: &str) -> String {
    PHOTO_EXTRA_PARAM.replace_all(url, "").into_owned()
}

/// Document titles become file names. Keep them inside the scratch dir.
fn scratch_name(title: &str) -> String {
    let name: String =
        title.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect();

    match name.as_str() {
        "" | "." | ".." => "document".into(),
        _ => name,
    }
}
