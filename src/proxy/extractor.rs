//! Extractor for pulling proxy config links out of free text

use crate::proxy::models::ConnectionRecord;
use once_cell::sync::Lazy;
use regex::Regex;

/// Recognized scheme prefix followed by a run of non-whitespace
static CONFIG_LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:vmess|vless|trojan|ss|ssr|hysteria|hysteria2|tuic)://\S+")
        .expect("Invalid config link regex")
});

/// Finds config links in message text and stamps them with a display label
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    encoded_label: String,
}

impl RecordExtractor {
    /// Create an extractor that labels every link with `display_name`
    pub fn new(display_name: &str) -> Self {
        Self {
            encoded_label: urlencoding::encode(display_name).into_owned(),
        }
    }

    /// Percent-encoded label appended after `#`
    pub fn encoded_label(&self) -> &str {
        &self.encoded_label
    }

    /// Extract every config link in `text`, in order of appearance
    pub fn extract(&self, text: &str) -> Vec<ConnectionRecord> {
        CONFIG_LINK_REGEX
            .find_iter(text)
            .filter_map(|m| ConnectionRecord::new(self.relabel(m.as_str().trim())))
            .collect()
    }

    /// Replace the fragment of `link` with the configured label, or append one
    pub fn relabel(&self, link: &str) -> String {
        let base = link.split_once('#').map_or(link, |(base, _)| base);
        format!("{}#{}", base, self.encoded_label)
    }
}
