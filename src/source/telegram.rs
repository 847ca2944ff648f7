//! Message source reading a public Telegram channel through its web preview
//!
//! The preview at `https://t.me/s/<channel>` serves the latest posts and pages
//! backwards with `?before=<id>`. No login is involved, so only public
//! channels are reachable.

use crate::source::{Message, MessageSource};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default base URL of the channel web preview
const DEFAULT_BASE_URL: &str = "https://t.me/s";

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

static POST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-post="[^"/]+/(\d+)""#).expect("Invalid post regex")
});

static TEXT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#)
        .expect("Invalid message text regex")
});

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<time[^>]*datetime="([^"]+)""#).expect("Invalid time regex")
});

static BR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("Invalid br regex"));

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#(\d+)|#[xX]([0-9a-fA-F]+)|(amp|lt|gt|quot|apos|nbsp));")
        .expect("Invalid entity regex")
});

/// Pages through a public channel's web preview, newest first
#[derive(Debug, Clone)]
pub struct TelegramWebSource {
    client: Client,
    base_url: String,
}

/// Paging position while streaming
struct PageState {
    before: Option<u64>,
    done: bool,
}

impl TelegramWebSource {
    /// Create a source with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a source with a custom HTTP timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the source at a different preview host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the preview URL for a channel page
    pub fn page_url(&self, channel: &str, before: Option<u64>) -> String {
        let channel = channel.trim().trim_start_matches('@');
        match before {
            Some(before) => format!("{}/{}?before={}", self.base_url, channel, before),
            None => format!("{}/{}", self.base_url, channel),
        }
    }

    /// Fetch one preview page, newest first
    pub async fn fetch_page(&self, channel: &str, before: Option<u64>) -> Result<Vec<Message>> {
        let url = self.page_url(channel, before);
        debug!(%url, "fetching channel page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        if !response.status().is_success() {
            bail!("Channel page {} returned HTTP status {}", url, response.status());
        }
        let html = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        let mut page = parse_page(&html);
        if let Some(before) = before {
            page.retain(|m| m.id < before);
        }
        Ok(page)
    }
}

impl MessageSource for TelegramWebSource {
    fn messages<'a>(&'a self, channel: &'a str, min_id: u64) -> BoxStream<'a, Result<Message>> {
        let start = PageState {
            before: None,
            done: false,
        };

        stream::try_unfold(start, move |state| async move {
            if state.done {
                return Ok(None);
            }

            let page = self.fetch_page(channel, state.before).await?;
            let Some(oldest) = page.last().map(|m| m.id) else {
                return Ok(None);
            };

            let done = oldest <= min_id.saturating_add(1)
                || state.before.is_some_and(|before| oldest >= before);
            let next = PageState {
                before: Some(oldest),
                done,
            };
            Ok::<_, anyhow::Error>(Some((page, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<Message, anyhow::Error>)))
        .try_flatten()
        .boxed()
    }
}

/// Extract messages from a preview page, newest first, one per id
pub fn parse_page(html: &str) -> Vec<Message> {
    let posts: Vec<(usize, u64)> = POST_REGEX
        .captures_iter(html)
        .filter_map(|cap| {
            let start = cap.get(0)?.start();
            let id = cap.get(1)?.as_str().parse().ok()?;
            Some((start, id))
        })
        .collect();

    let mut messages: Vec<Message> = posts
        .iter()
        .enumerate()
        .map(|(i, &(start, id))| {
            let end = posts.get(i + 1).map_or(html.len(), |&(next, _)| next);
            let block = &html[start..end];

            let text = TEXT_REGEX
                .captures(block)
                .and_then(|cap| cap.get(1))
                .map(|m| html_to_text(m.as_str()))
                .unwrap_or_default();
            let posted_at = TIME_REGEX
                .captures(block)
                .and_then(|cap| cap.get(1))
                .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
                .map(|dt| dt.with_timezone(&Utc));

            Message { id, text, posted_at }
        })
        .collect();

    messages.sort_by(|a, b| b.id.cmp(&a.id));
    messages.dedup_by_key(|m| m.id);
    messages
}

/// Flatten message HTML into plain text
fn html_to_text(fragment: &str) -> String {
    let with_breaks = BR_REGEX.replace_all(fragment, "\n");
    let stripped = TAG_REGEX.replace_all(&with_breaks, "");
    ENTITY_REGEX
        .replace_all(&stripped, |cap: &Captures| decode_entity(cap))
        .into_owned()
}

fn decode_entity(cap: &Captures) -> String {
    let code = if let Some(dec) = cap.get(1) {
        dec.as_str().parse::<u32>().ok()
    } else if let Some(hex) = cap.get(2) {
        u32::from_str_radix(hex.as_str(), 16).ok()
    } else {
        let named = match cap.get(3).map(|m| m.as_str()) {
            Some("amp") => "&",
            Some("lt") => "<",
            Some("gt") => ">",
            Some("quot") => "\"",
            Some("apos") => "'",
            Some("nbsp") => " ",
            _ => "",
        };
        return named.to_string();
    };

    code.and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| cap[0].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves canned `(status, body)` responses keyed by request path and
    /// records every path requested. Unknown paths get a 404.
    async fn serve_pages(pages: HashMap<String, (u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requested);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                log.lock().unwrap().push(path.clone());

                let (status, body) = pages
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, String::new()));
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/s", addr), requested)
    }

    /// Preview page holding `ids`, rendered oldest first like the real site
    fn preview_page(ids: &[u64]) -> String {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.iter()
            .map(|id| {
                format!(
                    r#"<div class="tgme_widget_message js-widget_message" data-post="chan/{id}"><div class="tgme_widget_message_text js-message_text" dir="auto">post {id}</div></div>"#
                )
            })
            .collect()
    }

    async fn collect_ids(source: &TelegramWebSource, min_id: u64) -> Vec<Result<u64>> {
        source
            .messages("@chan", min_id)
            .map(|item| item.map(|m| m.id))
            .collect()
            .await
    }

    fn ok_ids(items: Vec<Result<u64>>) -> Vec<u64> {
        items.into_iter().map(|item| item.unwrap()).collect()
    }

    const PAGE: &str = r#"
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="Chan/41" data-view="x">
<div class="tgme_widget_message_text js-message_text" dir="auto">old one<br/>trojan://pw@h:443#a</div>
<a class="tgme_widget_message_date" href="https://t.me/Chan/41"><time datetime="2024-03-01T08:00:00+00:00" class="time">08:00</time></a>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="Chan/42" data-view="y">
<div class="tgme_widget_message_text js-message_text" dir="auto"><a href="vless://id@1.2.3.4:443?a=1&amp;b=2#x">vless://id@1.2.3.4:443?a=1&amp;b=2#x</a> &lt;fast&gt; &#128640;</div>
<a class="tgme_widget_message_date" href="https://t.me/Chan/42"><time datetime="2024-03-01T09:30:00+00:00" class="time">09:30</time></a>
</div></div>
<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message service_message js-widget_message" data-post="Chan/43">
</div></div>
"#;

    #[test]
    fn test_parse_page_newest_first() {
        let messages = parse_page(PAGE);
        let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![43, 42, 41]);
    }

    #[test]
    fn test_parse_page_text_and_time() {
        let messages = parse_page(PAGE);
        assert_eq!(messages[0].text, "");
        assert!(messages[0].posted_at.is_none());
        assert_eq!(
            messages[1].text,
            "vless://id@1.2.3.4:443?a=1&b=2#x <fast> \u{1F680}"
        );
        assert_eq!(messages[2].text, "old one\ntrojan://pw@h:443#a");
        assert_eq!(
            messages[2].posted_at.map(|t| t.to_rfc3339()),
            Some("2024-03-01T08:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_page("<html><body>nothing here</body></html>").is_empty());
    }

    #[test]
    fn test_page_url() {
        let source = TelegramWebSource::new()
            .unwrap()
            .with_base_url("http://localhost:9/s/");
        assert_eq!(source.page_url("@chan", None), "http://localhost:9/s/chan");
        assert_eq!(
            source.page_url("chan", Some(100)),
            "http://localhost:9/s/chan?before=100"
        );
    }

    #[test]
    fn test_html_entities() {
        assert_eq!(html_to_text("a &amp;amp; b"), "a &amp; b");
        assert_eq!(html_to_text("&#x41;&#66;&nbsp;&unknown;"), "AB &unknown;");
    }

    #[tokio::test]
    async fn test_messages_page_backwards_until_empty_page() {
        let pages = HashMap::from([
            ("/s/chan".to_string(), (200, preview_page(&[28, 29, 30]))),
            ("/s/chan?before=28".to_string(), (200, preview_page(&[26, 27]))),
            ("/s/chan?before=26".to_string(), (200, String::new())),
        ]);
        let (base_url, requested) = serve_pages(pages).await;
        let source = TelegramWebSource::new().unwrap().with_base_url(base_url);

        let ids = ok_ids(collect_ids(&source, 0).await);

        assert_eq!(ids, vec![30, 29, 28, 27, 26]);
        assert_eq!(
            *requested.lock().unwrap(),
            vec!["/s/chan", "/s/chan?before=28", "/s/chan?before=26"]
        );
    }

    #[tokio::test]
    async fn test_messages_stop_paging_at_min_id() {
        let pages = HashMap::from([
            ("/s/chan".to_string(), (200, preview_page(&[28, 29, 30]))),
            ("/s/chan?before=28".to_string(), (200, preview_page(&[26, 27]))),
        ]);
        let (base_url, requested) = serve_pages(pages).await;
        let source = TelegramWebSource::new().unwrap().with_base_url(base_url);

        let ids = ok_ids(collect_ids(&source, 27).await);

        assert_eq!(ids, vec![30, 29, 28]);
        assert_eq!(*requested.lock().unwrap(), vec!["/s/chan"]);
    }

    #[tokio::test]
    async fn test_messages_error_status_is_fatal() {
        let pages = HashMap::from([("/s/chan".to_string(), (500, "boom".to_string()))]);
        let (base_url, _) = serve_pages(pages).await;
        let source = TelegramWebSource::new().unwrap().with_base_url(base_url);

        let items = collect_ids(&source, 0).await;

        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("500"), "{}", err);
    }

    #[tokio::test]
    async fn test_messages_error_on_later_page_follows_earlier_items() {
        let pages = HashMap::from([
            ("/s/chan".to_string(), (200, preview_page(&[9, 10]))),
            ("/s/chan?before=9".to_string(), (503, String::new())),
        ]);
        let (base_url, _) = serve_pages(pages).await;
        let source = TelegramWebSource::new().unwrap().with_base_url(base_url);

        let items = collect_ids(&source, 0).await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &10);
        assert_eq!(items[1].as_ref().unwrap(), &9);
        assert!(items[2].is_err());
    }
}
