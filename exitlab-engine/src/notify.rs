//! Notification sinks for trade exits.
//!
//! Delivery is best-effort: dispatch logs failures and never propagates
//! them into the evaluation path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use exitlab_core::domain::ClosedTrade;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Event dispatched to every configured sink when a trade closes.
#[derive(Debug, Clone, Serialize)]
pub struct TradeExitEvent<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: &'a str,
    pub ts: DateTime<Utc>,
    pub payload: &'a ClosedTrade,
}

impl<'a> TradeExitEvent<'a> {
    pub fn new(source: &'a str, ts: DateTime<Utc>, payload: &'a ClosedTrade) -> Self {
        Self {
            kind: "trade_exit",
            source,
            ts,
            payload,
        }
    }
}

/// External notification sink.
pub trait Notifier: Send {
    fn name(&self) -> &str;
    fn notify(&self, event: &TradeExitEvent) -> Result<(), NotifyError>;
}

/// Send to every sink; failures are logged and swallowed.
pub fn dispatch(notifiers: &[Box<dyn Notifier>], event: &TradeExitEvent) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(event) {
            tracing::warn!(
                notifier = notifier.name(),
                signal_id = %event.payload.signal_id,
                error = %e,
                "notifier failed"
            );
        }
    }
}

/// Writes exits to the log stream.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, event: &TradeExitEvent) -> Result<(), NotifyError> {
        tracing::info!(
            source = event.source,
            signal_id = %event.payload.signal_id,
            reason = ?event.payload.exit_reason,
            "trade exit"
        );
        Ok(())
    }
}

/// POSTs the event as JSON to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify(&self, event: &TradeExitEvent) -> Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(event).send()?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(format!("HTTP {}", resp.status())));
        }
        Ok(())
    }
}
