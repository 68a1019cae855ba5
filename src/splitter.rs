//! Turns a composed post into the sequence of Telegram sends it needs.

use crate::resolver::Document;

/// Longest text message Telegram accepts.
pub const MAX_TEXT_LEN: usize = 4096;
/// Longest photo caption Telegram accepts.
pub const MAX_CAPTION_LEN: usize = 1024;
/// Fragment size that leaves room for both continuation markers.
pub const FRAGMENT_LEN: usize = 4084;

const CONTINUES: &str = " (...)";
const CONTINUED: &str = "(...) ";

#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryUnit {
    Text(String),
    Photo { url: String, caption: Option<String> },
    Album { urls: Vec<String>, caption: Option<String> },
    Document(Document),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Send(DeliveryUnit),
    /// Rate-limit pause between consecutive sends.
    Pause,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

/// Cut `text` into `FRAGMENT_LEN`-character pieces and mark the seams.
pub fn split_text(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let pieces: Vec<String> = chars.chunks(FRAGMENT_LEN).map(|c| c.iter().collect()).collect();
    let last = pieces.len().saturating_sub(1);

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let head = if i > 0 { CONTINUED } else { "" };
            let tail = if i < last { CONTINUES } else { "" };
            format!("{head}{piece}{tail}")
        })
        .collect()
}

/// One message when it fits, paced fragments otherwise. Nothing for empty text.
fn text_steps(text: &str) -> Vec<Step> {
    if text.is_empty() {
        return vec![];
    }
    if char_len(text) <= MAX_TEXT_LEN {
        return vec![Step::Send(DeliveryUnit::Text(text.to_string()))];
    }

    let mut steps = vec![];
    for (i, part) in split_text(text).into_iter().enumerate() {
        if i > 0 {
            steps.push(Step::Pause);
        }
        steps.push(Step::Send(DeliveryUnit::Text(part)));
    }

    steps
}

fn photo_steps(text: &str, url: &str) -> Vec<Step> {
    if char_len(text) <= MAX_CAPTION_LEN {
        let caption = non_empty(text);
        return vec![Step::Send(DeliveryUnit::Photo { url: url.to_string(), caption })];
    }

    let with_preview = format!("<a href=\"{}\"> </a>{}", url, text);
    if char_len(&with_preview) <= MAX_TEXT_LEN {
        return vec![Step::Send(DeliveryUnit::Text(with_preview))];
    }

    let mut steps = text_steps(text);
    steps.push(Step::Pause);
    steps.push(Step::Send(DeliveryUnit::Photo { url: url.to_string(), caption: None }));

    steps
}

fn album_steps(text: &str, urls: &[String]) -> Vec<Step> {
    let mut steps = vec![];
    let caption = if char_len(text) <= MAX_CAPTION_LEN {
        non_empty(text)
    } else {
        steps.extend(text_steps(text));
        steps.push(Step::Pause);
        None
    };

    steps.push(Step::Send(DeliveryUnit::Album { urls: urls.to_vec(), caption }));

    steps
}

/// Plan every send for a post: text and photos first, then documents.
pub fn plan(text: &str, photos: &[String], documents: &[Document]) -> Vec<Step> {
    let mut steps = match photos {
        [] => text_steps(text),
        [url] => photo_steps(text, url),
        urls => album_steps(text, urls),
    };

    for (i, doc) in documents.iter().enumerate() {
        if i > 0 {
            steps.push(Step::Pause);
        }
        steps.push(Step::Send(DeliveryUnit::Document(doc.clone())));
    }

    steps
}
