use crate::{config::FeedConfig, logging::LogContext, sources::RawPost};

/// Decide whether a post may be relayed to the feed's channel.
///
/// Only the word lists reject. Ad and copyright markers are reported but the
/// post still goes through.
pub fn admit(post: &RawPost, feed: &FeedConfig, log: &LogContext) -> bool {
    if contains_any(&post.text, &feed.blacklist) {
        log.info(format!("[id:{}] Post was skipped due to blacklist filter", post.id));
        return false;
    }

    if !feed.whitelist.is_empty() && !contains_any(&post.text, &feed.whitelist) {
        log.info(format!("[id:{}] Post was skipped due to whitelist filter", post.id));
        return false;
    }

    if feed.skip_ads && post.is_ad() {
        log.info(format!("[id:{}] Post was skipped because it was flagged as ad", post.id));
    }
    if feed.skip_copyrighted && post.has_copyright() {
        log.info(format!("[id:{}] Post was skipped because it has copyright", post.id));
    }

    true
}

/// Case-insensitive substring match against any of `words`.
fn contains_any(text: &str, words: &[String]) -> bool {
    let text = text.to_lowercase();

    words.iter().any(|w| text.contains(&w.to_lowercase()))
}
