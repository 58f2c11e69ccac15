//! Caller notification channel.
//!
//! Resuming a blocked caller is a message send keyed by correlation id;
//! the core never holds caller objects. Delivery is fire-and-forget,
//! at-least-once: senders log failures and move on.

use async_trait::async_trait;
use relay_core::{ChainOutcome, CorrelationId};
use tokio::sync::mpsc;
use tracing::debug;

/// Channel that resumes the caller awaiting a task or chain outcome.
#[async_trait]
pub trait CallerNotifier: Send + Sync {
    /// Deliver a terminal outcome to the caller behind `correlation`.
    async fn notify(
        &self,
        correlation: &CorrelationId,
        outcome: &ChainOutcome,
    ) -> Result<(), anyhow::Error>;
}

/// In-process notifier backed by an unbounded tokio channel.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(CorrelationId, ChainOutcome)>,
}

impl ChannelNotifier {
    /// Create a notifier plus the receiver the embedding caller drains.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(CorrelationId, ChainOutcome)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CallerNotifier for ChannelNotifier {
    async fn notify(
        &self,
        correlation: &CorrelationId,
        outcome: &ChainOutcome,
    ) -> Result<(), anyhow::Error> {
        debug!(%correlation, "notifying caller");
        self.tx
            .send((correlation.clone(), outcome.clone()))
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }
}

/// Notifier that POSTs outcomes to a webhook endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// Create a notifier targeting `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl CallerNotifier for WebhookNotifier {
    async fn notify(
        &self,
        correlation: &CorrelationId,
        outcome: &ChainOutcome,
    ) -> Result<(), anyhow::Error> {
        let body = serde_json::json!({
            "correlation": correlation,
            "outcome": outcome,
        });
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::TaskId;

    #[tokio::test]
    async fn channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let correlation = CorrelationId::new("caller-1");
        let outcome = ChainOutcome::Success {
            task: TaskId::new(),
        };

        notifier.notify(&correlation, &outcome).await.unwrap();

        let (got_correlation, got_outcome) = rx.recv().await.unwrap();
        assert_eq!(got_correlation, correlation);
        assert_eq!(got_outcome, outcome);
    }

    #[tokio::test]
    async fn dropped_receiver_is_an_error_not_a_panic() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let outcome = ChainOutcome::Success {
            task: TaskId::new(),
        };
        assert!(notifier
            .notify(&CorrelationId::new("caller-1"), &outcome)
            .await
            .is_err());
    }
}
