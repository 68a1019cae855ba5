use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
};

use crate::{
    compose::{compose, escape_html, repost_footer, RepostHeader},
    config::{FeedConfig, Pacing},
    dedup::DedupTracker,
    delivery::DeliveryEngine,
    filter,
    logging::{AdminSink, LogContext},
    resolver::{prepare_scratch, Resolver},
    sources::{FeedSource, RawPost},
    splitter::{plan, Step},
    telegram::Destination,
};

/// Fixed settings shared by every feed.
pub struct RelayOptions {
    /// Holds one `<feed>.json` per feed.
    pub state_dir: PathBuf,
    /// Documents wait here between download and upload.
    pub scratch_dir: PathBuf,
    pub max_ids: usize,
    pub max_send_attempts: u32,
    pub pacing: Pacing,
}

/// Outcome of one feed's polling pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Posts not seen before, admitted or not.
    pub fresh: usize,
    /// Posts that got at least one message out.
    pub delivered: usize,
}

pub struct Relay<'a> {
    source: &'a dyn FeedSource,
    dest: &'a dyn Destination,
    options: &'a RelayOptions,
    sink: Option<&'a AdminSink>,
}

impl<'a> Relay<'a> {
    pub fn new(
        source: &'a dyn FeedSource,
        dest: &'a dyn Destination,
        options: &'a RelayOptions,
        sink: Option<&'a AdminSink>,
    ) -> Self {
        Self { source, dest, options, sink }
    }

    /// Poll every feed once, one after another.
    pub fn run_cycle(&self, feeds: &[FeedConfig]) {
        for feed in feeds {
            self.check_feed(feed);
        }
    }

    /// Relay unseen posts of one feed and remember their ids.
    pub fn check_feed(&self, feed: &FeedConfig) -> CycleReport {
        let log = LogContext::for_feed(feed, self.sink);
        let mut report = CycleReport::default();

        if let Err(e) = self.dest.get_chat_administrators(&feed.channel) {
            log.error(format!(
                "Bot is not channel admin [{}] or Telegram servers are down: {}",
                feed.channel, e
            ));
            log.warn("There is no admin permission for the bot in a chat");
        }
        log.info(format!("Scanning for new posts in {}", feed.domain));

        let state_file = self.options.state_dir.join(feed.state_file());
        let mut tracker = match DedupTracker::load(&state_file) {
            Ok(tracker) => tracker,
            Err(e) => {
                log.error(format!("Could not read from storage, skipped iteration: {}", e));
                return report;
            }
        };

        let posts = match self.source.fetch_posts(feed) {
            Ok(posts) => posts,
            Err(e) if e.is_transient() => {
                log.warn(format!(
                    "Got timeout while retrieving VK data from {}, cancelling: {}",
                    feed.domain, e
                ));
                return report;
            }
            Err(e) => {
                log.error(format!("Failed to retrieve VK data from {}: {}", feed.domain, e));
                return report;
            }
        };

        for post in &posts {
            if tracker.contains(post.id) {
                continue;
            }

            log.info(format!("Got fresh post id:{}", post.id));
            report.fresh += 1;
            if self.process_post(post, feed, &log) {
                report.delivered += 1;
            }
            tracker.append(post.id);
        }

        tracker.trim(self.options.max_ids);
        if let Err(e) = tracker.persist() {
            log.error(format!("Could not write to storage: {}", e));
        }

        log.info(format!(
            "Scanning finished: {} fresh, {} delivered",
            report.fresh, report.delivered
        ));

        report
    }

    /// Filter, resolve, compose and send one post, then its repost if any.
    /// Returns whether anything reached the channel.
    pub fn process_post(&self, post: &RawPost, feed: &FeedConfig, log: &LogContext) -> bool {
        if !filter::admit(post, feed, log) {
            return false;
        }
        log.info(format!("[id:{}] Bot is working with this post", post.id));

        if let Err(e) = prepare_scratch(&self.options.scratch_dir) {
            log.error(format!("[id:{}] Could not prepare scratch directory: {}", post.id, e));
            return false;
        }

        let resolver = Resolver::new(
            self.source,
            &self.options.scratch_dir,
            self.options.pacing.after_video_lookup,
        );
        let engine = DeliveryEngine::new(
            self.dest,
            self.source,
            &feed.channel,
            &self.options.pacing,
            self.options.max_send_attempts,
        );

        let repost = post.repost();
        let author = repost.map(|r| self.group_name(r, post.id, log));

        let escaped = escape_html(&post.text);
        let res = resolver.resolve(post.id, &post.attachments, &escaped, log);
        let mut text = compose(escaped, &res.links, &res.videos, None);
        if let (Some(author), false) = (&author, text.is_empty()) {
            text = repost_footer(&text, author);
        }

        let steps = plan(&text, &res.photos, &res.documents);
        if steps.is_empty() {
            log.info(format!("[id:{}] Text post skipped because it is empty", post.id));
        }
        let mut sent = self.deliver(&engine, post.id, &steps, log);

        if let (Some(repost), Some(author)) = (repost, &author) {
            let url = repost.url();
            let header = RepostHeader { url: &url, author: author.as_str() };

            let escaped = escape_html(&repost.text);
            let res = resolver.resolve(post.id, &repost.attachments, &escaped, log);
            let text = compose(escaped, &res.links, &res.videos, Some(&header));

            let steps = plan(&text, &res.photos, &res.documents);
            sent += self.deliver(&engine, post.id, &steps, log);
        }

        sent > 0
    }

    fn deliver(
        &self,
        engine: &DeliveryEngine,
        post_id: i64,
        steps: &[Step],
        log: &LogContext,
    ) -> usize {
        let report = engine.deliver(post_id, steps, log);
        if report.failed > 0 {
            log.warn(format!("[id:{}] {} message(s) could not be sent", post_id, report.failed));
        }

        report.sent
    }

    /// Community name of a repost's owner. Empty when the lookup fails.
    fn group_name(&self, repost: &RawPost, post_id: i64, log: &LogContext) -> String {
        match self.source.group_name(repost.owner_id.abs()) {
            Ok(name) => name,
            Err(e) => {
                log.error(format!("[id:{}] Could not look up repost author: {}", post_id, e));
                String::new()
            }
        }
    }
}

/// One cycle with defects contained. A panic anywhere in the cycle is logged
/// and reported as `false` so the poll loop can still sleep or exit.
pub fn run_guarded(relay: &Relay, feeds: &[FeedConfig]) -> bool {
    let cycle = panic::catch_unwind(AssertUnwindSafe(|| relay.run_cycle(feeds)));
    if cycle.is_err() {
        LogContext::system().error("Something went wrong in the main loop");
    }

    cycle.is_ok()
}
