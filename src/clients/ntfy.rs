use reqwest::Client;
use reqwest::header::HeaderValue;
use std::time::Duration;
use tracing::debug;

/// ntfy rejects header values above this size.
pub const MAX_TITLE_CHARS: usize = 250;

/// Larger messages are turned into attachments by ntfy.
pub const MAX_BODY_BYTES: usize = 4096;

const ELLIPSIS: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Invalid notification header: {0}")]
    Header(String),
}

/// Delivery target for rendered digests. Every error is retryable from the
/// caller's point of view.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<(), SinkError>;
}

/// Truncates to at most `max` characters, marking the cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Truncates to at most `max` bytes without splitting a character.
#[must_use]
pub fn truncate_bytes(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max.saturating_sub(ELLIPSIS.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ELLIPSIS}", &text[..end])
}

/// Makes a title usable as an HTTP header: Latin-1 only, no control
/// characters, bounded length. Common typographic dashes become `-`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            '\n' | '\r' | '\t' => ' ',
            other => other,
        })
        .filter(|c| u32::from(*c) <= 0xFF && !c.is_control())
        .collect();
    truncate_chars(cleaned.trim(), MAX_TITLE_CHARS)
}

/// Bounds a message body for the transport.
#[must_use]
pub fn sanitize_body(body: &str) -> String {
    truncate_bytes(body, MAX_BODY_BYTES)
}

fn latin1_header(value: &str) -> Result<HeaderValue, SinkError> {
    let bytes: Vec<u8> = value
        .chars()
        .filter_map(|c| u8::try_from(u32::from(c)).ok())
        .collect();
    HeaderValue::from_bytes(&bytes).map_err(|e| SinkError::Header(e.to_string()))
}

/// Publishes to an ntfy topic URL.
pub struct NtfySink {
    client: Client,
    url: String,
    priority: String,
    tags: Vec<String>,
}

impl NtfySink {
    pub fn new(
        url: impl Into<String>,
        priority: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("notamwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            priority: priority.into(),
            tags,
        })
    }
}

#[async_trait::async_trait]
impl NotificationSink for NtfySink {
    async fn send(&self, title: &str, body: &str) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Title", latin1_header(&sanitize_title(title))?)
            .header("Priority", latin1_header(&self.priority)?)
            .body(sanitize_body(body));

        if !self.tags.is_empty() {
            request = request.header("Tags", latin1_header(&self.tags.join(","))?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        debug!(url = %self.url, "Notification delivered");
        Ok(())
    }
}
