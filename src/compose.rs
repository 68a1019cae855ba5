//! Message text assembly for Telegram's HTML parse mode.

/// Escape characters Telegram's HTML parser treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Heading linking a reposted post back to its origin.
pub struct RepostHeader<'a> {
    pub url: &'a str,
    pub author: &'a str,
}

/// Text being built up link by link.
struct Composer {
    text: String,
    first_link: bool,
}

impl Composer {
    fn new(text: String) -> Self {
        Self { text, first_link: true }
    }

    fn with_header(self, header: &RepostHeader) -> Self {
        let heading = format!(
            "<a href=\"{}\"><b>REPOST ↓ {}</b></a>",
            header.url,
            escape_html(header.author)
        );
        let text = if self.text.is_empty() {
            heading
        } else {
            format!("{}\n\n{}", heading, self.text)
        };

        Self { text, ..self }
    }

    /// Append a URL unless the text already mentions it. The first URL of a
    /// non-empty text also gets an invisible anchor in front so Telegram
    /// previews it.
    fn push_link(mut self, link: &str) -> Self {
        if self.text.contains(link) {
            return self;
        }

        if self.text.is_empty() {
            self.text.push_str(link);
        } else {
            if self.first_link {
                self.text = format!("<a href=\"{}\"> </a>{}\n", link, self.text);
            }
            self.text.push('\n');
            self.text.push_str(link);
        }
        self.first_link = false;

        self
    }

    fn finish(self) -> String {
        self.text
    }
}

/// Merge escaped post text with its videos, then links.
pub fn compose(
    text: String,
    links: &[String],
    videos: &[String],
    repost: Option<&RepostHeader>,
) -> String {
    let mut composer = Composer::new(text);
    if let Some(header) = repost {
        composer = composer.with_header(header);
    }

    videos
        .iter()
        .chain(links)
        .fold(composer, |c, link| c.push_link(link))
        .finish()
}

/// Footer marking that a repost follows in the next messages.
pub fn repost_footer(text: &str, author: &str) -> String {
    format!("{}\n\nREPOST ↓ {}", text, escape_html(author))
}
