//! In-memory stand-ins for the VK and Telegram clients.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    io::{self, ErrorKind},
    path::Path,
    rc::Rc,
    sync::{Arc, Mutex},
};

use crate::{
    config::FeedConfig,
    error::{Error, Result},
    sources::{
        Attachment, DocumentAttachment, FeedSource, LinkAttachment, PhotoAttachment, PhotoSize,
        RawPost, VideoAttachment,
    },
    telegram::Destination,
};

pub fn feed(name: &str) -> FeedConfig {
    FeedConfig {
        name: name.into(),
        domain: format!("club_{name}"),
        channel: format!("@club_{name}"),
        filter: "all".into(),
        count: 10,
        skip_ads: true,
        skip_copyrighted: false,
        blacklist: vec![],
        whitelist: vec![],
    }
}

pub fn post(id: i64, text: &str) -> RawPost {
    RawPost { id, owner_id: -1, from_id: -1, text: text.into(), ..Default::default() }
}

pub fn link(url: &str) -> Attachment {
    Attachment::Link(LinkAttachment { url: url.into() })
}

pub fn video(owner_id: i64, id: i64) -> Attachment {
    Attachment::Video(VideoAttachment { id, owner_id, access_key: Some("key".into()) })
}

pub fn photo(sizes: &[(&str, &str)]) -> Attachment {
    Attachment::Photo(PhotoAttachment {
        sizes: sizes
            .iter()
            .map(|(t, url)| PhotoSize { r#type: t.to_string(), url: url.to_string() })
            .collect(),
    })
}

pub fn document(title: &str, size: u64) -> Attachment {
    Attachment::Document(DocumentAttachment {
        title: title.into(),
        size,
        r#type: 1,
        url: format!("https://vk.com/doc/{title}"),
    })
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Message { chat_id: String, text: String },
    Photo { chat_id: String, url: String, caption: Option<String> },
    Album { chat_id: String, photos: Vec<Vec<u8>>, caption: Option<String> },
    Document { chat_id: String, file_name: String },
}

impl Sent {
    pub fn text(&self) -> Option<&str> {
        match self {
            Sent::Message { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Failure {
    Connection,
    Api,
}

#[derive(Default)]
struct DestinationState {
    sent: Vec<Sent>,
    attempts: usize,
    failures: VecDeque<Failure>,
    admin_ok: bool,
    panic_on_admin_check: bool,
}

/// Records every successful send. Clones share the same record.
#[derive(Clone)]
pub struct SharedDestination(Rc<RefCell<DestinationState>>);

impl Default for SharedDestination {
    fn default() -> Self {
        Self(Rc::new(RefCell::new(DestinationState { admin_ok: true, ..Default::default() })))
    }
}

impl SharedDestination {
    pub fn sent(&self) -> Vec<Sent> {
        self.0.borrow().sent.clone()
    }

    pub fn attempts(&self) -> usize {
        self.0.borrow().attempts
    }

    /// Upcoming sends fail in this order before succeeding again.
    pub fn fail_with(&self, failures: &[Failure]) {
        self.0.borrow_mut().failures.extend(failures.iter().copied());
    }

    pub fn deny_admin(&self) {
        self.0.borrow_mut().admin_ok = false;
    }

    /// The next admin check panics instead of answering.
    pub fn panic_once(&self) {
        self.0.borrow_mut().panic_on_admin_check = true;
    }

    fn record(&self, sent: Sent) -> Result<()> {
        let mut state = self.0.borrow_mut();
        state.attempts += 1;

        match state.failures.pop_front() {
            Some(Failure::Connection) => {
                Err(Error::Io(std::io::Error::new(ErrorKind::ConnectionReset, "connection reset")))
            }
            Some(Failure::Api) => {
                Err(Error::Telegram { code: 400, description: "Bad Request".into() })
            }
            None => {
                state.sent.push(sent);
                Ok(())
            }
        }
    }
}

impl Destination for SharedDestination {
    fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.record(Sent::Message { chat_id: chat_id.into(), text: text.into() })
    }

    fn send_photo(&self, chat_id: &str, photo_url: &str, caption: Option<&str>) -> Result<()> {
        self.record(Sent::Photo {
            chat_id: chat_id.into(),
            url: photo_url.into(),
            caption: caption.map(String::from),
        })
    }

    fn send_media_group(
        &self,
        chat_id: &str,
        photos: Vec<Vec<u8>>,
        caption: Option<&str>,
    ) -> Result<()> {
        self.record(Sent::Album {
            chat_id: chat_id.into(),
            photos,
            caption: caption.map(String::from),
        })
    }

    fn send_document(&self, chat_id: &str, path: &Path) -> Result<()> {
        std::fs::metadata(path)?;
        let file_name =
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        self.record(Sent::Document { chat_id: chat_id.into(), file_name })
    }

    fn get_chat_administrators(&self, chat_id: &str) -> Result<()> {
        let panics = std::mem::take(&mut self.0.borrow_mut().panic_on_admin_check);
        if panics {
            panic!("admin check for {chat_id} blew up");
        }

        if self.0.borrow().admin_ok {
            Ok(())
        } else {
            Err(Error::Telegram { code: 400, description: "Bad Request: chat not found".into() })
        }
    }
}

/// Serves canned wall data; downloads return the URL's bytes.
#[derive(Default)]
pub struct FakeSource {
    pub posts: Vec<RawPost>,
    pub fetch_failure: Option<Failure>,
    pub video_urls: HashMap<(i64, i64), String>,
    pub video_failures: HashSet<(i64, i64)>,
    pub group_names: HashMap<i64, String>,
    pub video_lookups: RefCell<usize>,
    pub downloads: RefCell<Vec<String>>,
}

impl FeedSource for FakeSource {
    fn fetch_posts(&self, _feed: &FeedConfig) -> Result<Vec<RawPost>> {
        match self.fetch_failure {
            Some(Failure::Connection) => {
                Err(Error::Io(std::io::Error::new(ErrorKind::TimedOut, "timed out")))
            }
            Some(Failure::Api) => Err(Error::Vk { code: 5, message: "auth failed".into() }),
            None => Ok(self.posts.clone()),
        }
    }

    fn video_url(&self, owner_id: i64, video_id: i64, _access_key: &str) -> Result<Option<String>> {
        *self.video_lookups.borrow_mut() += 1;

        if self.video_failures.contains(&(owner_id, video_id)) {
            return Err(Error::Vk { code: 29, message: "Rate limit reached".into() });
        }
        Ok(self.video_urls.get(&(owner_id, video_id)).cloned())
    }

    fn group_name(&self, group_id: i64) -> Result<String> {
        self.group_names
            .get(&group_id)
            .cloned()
            .ok_or_else(|| Error::MissingData(format!("group {group_id}")))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads.borrow_mut().push(url.into());

        Ok(url.as_bytes().to_vec())
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber that keeps formatted lines, and return them.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    let lines = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();

    (out, lines)
}
