use std::thread;

use crate::{
    config::Pacing,
    error::Result,
    logging::LogContext,
    sources::FeedSource,
    splitter::{DeliveryUnit, Step},
    telegram::Destination,
};

/// Counts of one post's sends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct DeliveryEngine<'a> {
    dest: &'a dyn Destination,
    source: &'a dyn FeedSource,
    channel: &'a str,
    pacing: &'a Pacing,
    max_attempts: u32,
}

impl<'a> DeliveryEngine<'a> {
    pub fn new(
        dest: &'a dyn Destination,
        source: &'a dyn FeedSource,
        channel: &'a str,
        pacing: &'a Pacing,
        max_attempts: u32,
    ) -> Self {
        Self { dest, source, channel, pacing, max_attempts: max_attempts.max(1) }
    }

    /// Run a plan in order. A failed unit does not stop the ones after it.
    pub fn deliver(&self, post_id: i64, steps: &[Step], log: &LogContext) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for step in steps {
            match step {
                Step::Pause => thread::sleep(self.pacing.between_messages),
                Step::Send(unit) => match self.send_with_retry(post_id, unit, log) {
                    Ok(()) => {
                        report.sent += 1;
                        log.info(format!("[id:{}] {} sent", post_id, describe(unit)));
                    }
                    Err(e) => {
                        report.failed += 1;
                        log.error(format!("[id:{}] {} not sent: {}", post_id, describe(unit), e));
                    }
                },
            }
        }

        report
    }

    fn send_with_retry(&self, post_id: i64, unit: &DeliveryUnit, log: &LogContext) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.send(unit) {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    log.warn(format!("[id:{}] {}", post_id, e));
                    log.info(format!("[id:{}] Bot trying to resend message to user", post_id));
                    thread::sleep(self.pacing.retry_backoff);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn send(&self, unit: &DeliveryUnit) -> Result<()> {
        match unit {
            DeliveryUnit::Text(text) => self.dest.send_message(self.channel, text),
            DeliveryUnit::Photo { url, caption } => {
                self.dest.send_photo(self.channel, url, caption.as_deref())
            }
            DeliveryUnit::Album { urls, caption } => {
                let photos = urls
                    .iter()
                    .map(|url| self.source.download(url))
                    .collect::<Result<Vec<_>>>()?;
                self.dest.send_media_group(self.channel, photos, caption.as_deref())
            }
            DeliveryUnit::Document(doc) => self.dest.send_document(self.channel, &doc.path),
        }
    }
}

fn describe(unit: &DeliveryUnit) -> String {
    match unit {
        DeliveryUnit::Text(_) => "Text post".into(),
        DeliveryUnit::Photo { caption: Some(_), .. } => "Post with photo".into(),
        DeliveryUnit::Photo { caption: None, .. } => "Photo".into(),
        DeliveryUnit::Album { urls, .. } => format!("Album of {} photos", urls.len()),
        DeliveryUnit::Document(doc) => {
            format!("Document [{:?}] {} ({})", doc.kind, doc.title, doc.url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeSource, Failure, Sent, SharedDestination};

    fn text(t: &str) -> Step {
        Step::Send(DeliveryUnit::Text(t.into()))
    }

    #[test]
    fn test_sends_in_order() {
        let dest = SharedDestination::default();
        let source = FakeSource::default();
        let pacing = Pacing::none();
        let engine = DeliveryEngine::new(&dest, &source, "@chan", &pacing, 2);

        let report = engine.deliver(1, &[text("a"), Step::Pause, text("b")], &LogContext::system());

        assert_eq!(report, DeliveryReport { sent: 2, failed: 0 });
        let texts: Vec<_> = dest.sent().iter().filter_map(|s| s.text().map(String::from)).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_connection_failure_retried_once() {
        let dest = SharedDestination::default();
        dest.fail_with(&[Failure::Connection]);
        let source = FakeSource::default();
        let pacing = Pacing::none();
        let engine = DeliveryEngine::new(&dest, &source, "@chan", &pacing, 2);

        let report = engine.deliver(1, &[text("a")], &LogContext::system());

        assert_eq!(report, DeliveryReport { sent: 1, failed: 0 });
        assert_eq!(dest.attempts(), 2);
    }

    #[test]
    fn test_retries_are_bounded() {
        let dest = SharedDestination::default();
        dest.fail_with(&[Failure::Connection, Failure::Connection, Failure::Connection]);
        let source = FakeSource::default();
        let pacing = Pacing::none();
        let engine = DeliveryEngine::new(&dest, &source, "@chan", &pacing, 2);

        let report = engine.deliver(1, &[text("a"), text("b")], &LogContext::system());

        // "a" gives up after two attempts, "b" eats the third failure then retries.
        assert_eq!(report, DeliveryReport { sent: 1, failed: 1 });
        assert_eq!(dest.attempts(), 4);
    }

    #[test]
    fn test_api_failure_not_retried() {
        let dest = SharedDestination::default();
        dest.fail_with(&[Failure::Api]);
        let source = FakeSource::default();
        let pacing = Pacing::none();
        let engine = DeliveryEngine::new(&dest, &source, "@chan", &pacing, 3);

        let report = engine.deliver(1, &[text("a"), text("b")], &LogContext::system());

        assert_eq!(report, DeliveryReport { sent: 1, failed: 1 });
        assert_eq!(dest.attempts(), 2);
        assert_eq!(dest.sent()[0].text(), Some("b"));
    }

    #[test]
    fn test_album_photos_downloaded_before_send() {
        let dest = SharedDestination::default();
        let source = FakeSource::default();
        let pacing = Pacing::none();
        let engine = DeliveryEngine::new(&dest, &source, "@chan", &pacing, 2);
        let urls = vec!["https://p/1.jpg".to_string(), "https://p/2.jpg".to_string()];

        engine.deliver(
            1,
            &[Step::Send(DeliveryUnit::Album { urls: urls.clone(), caption: Some("c".into()) })],
            &LogContext::system(),
        );

        assert_eq!(*source.downloads.borrow(), urls);
        assert_eq!(
            dest.sent(),
            vec![Sent::Album {
                chat_id: "@chan".into(),
                photos: vec![b"https://p/1.jpg".to_vec(), b"https://p/2.jpg".to_vec()],
                caption: Some("c".into()),
            }]
        );
    }
}
