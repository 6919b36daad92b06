//! Operator notifications, fanned out to every configured channel.

mod channels;

pub use channels::{DesktopChannel, EmailChannel, LogChannel};

use async_trait::async_trait;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{}", label)
    }
}

/// One operator-facing event. The optional trace carries diagnostic detail
/// (an error chain, a response body) that channels may append to the message.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub severity: Severity,
    pub message: String,
    pub trace: Option<String>,
}

impl NotificationEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

/// How a given severity is presented: desktop urgency, desktop timeout
/// (`None` means the popup stays until dismissed) and whether the event is
/// important enough to email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub urgency: Urgency,
    pub timeout_ms: Option<u32>,
    pub email_eligible: bool,
}

impl DeliveryPolicy {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical | Severity::Error => Self {
                urgency: Urgency::Critical,
                timeout_ms: None,
                email_eligible: true,
            },
            Severity::Warning | Severity::Info => Self {
                urgency: Urgency::Normal,
                timeout_ms: Some(2000),
                email_eligible: false,
            },
            Severity::Debug => Self {
                urgency: Urgency::Low,
                timeout_ms: Some(2000),
                email_eligible: false,
            },
        }
    }
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()>;
}

/// Fans an event out to all channels. Notification failures are logged and
/// swallowed; a broken desktop bus must never take down a harvest pass.
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn Channel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Box<dyn Channel>>) -> Self {
        Self { channels }
    }

    pub async fn notify(&self, event: NotificationEvent) {
        for channel in &self.channels {
            if let Err(e) = channel.deliver(&event).await {
                warn!("Notification channel {} failed: {:#}", channel.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingChannel;

    #[async_trait]
    impl Channel for FailingChannel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _event: &NotificationEvent) -> anyhow::Result<()> {
            bail!("bus unavailable")
        }
    }

    struct RecordingChannel {
        deliveries: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, _event: &NotificationEvent) -> anyhow::Result<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_policy_for_error_severities() {
        for severity in [Severity::Critical, Severity::Error] {
            let policy = DeliveryPolicy::for_severity(severity);
            assert_eq!(policy.urgency, Urgency::Critical);
            assert_eq!(policy.timeout_ms, None);
            assert!(policy.email_eligible);
        }
    }

    #[test]
    fn test_policy_for_routine_severities() {
        for severity in [Severity::Warning, Severity::Info] {
            let policy = DeliveryPolicy::for_severity(severity);
            assert_eq!(policy.urgency, Urgency::Normal);
            assert_eq!(policy.timeout_ms, Some(2000));
            assert!(!policy.email_eligible);
        }
        let debug = DeliveryPolicy::for_severity(Severity::Debug);
        assert_eq!(debug.urgency, Urgency::Low);
        assert!(!debug.email_eligible);
    }

    #[tokio::test]
    async fn test_dispatch_survives_failing_channel() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let dispatcher = NotificationDispatcher::new(vec![
            Box::new(FailingChannel),
            Box::new(RecordingChannel {
                deliveries: Arc::clone(&deliveries),
            }),
        ]);

        dispatcher
            .notify(NotificationEvent::new(Severity::Error, "something broke"))
            .await;
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }
}
