//! Concrete notification channels: the log, the desktop bus, and sendmail.

use crate::notify::{Channel, DeliveryPolicy, NotificationEvent, Severity, Urgency};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

fn full_text(event: &NotificationEvent) -> String {
    match &event.trace {
        Some(trace) => format!("{}\n{}", event.message, trace),
        None => event.message.clone(),
    }
}

/// Mirrors every event into the process log at the matching level.
pub struct LogChannel;

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        let text = full_text(event);
        match event.severity {
            Severity::Debug => debug!("{}", text),
            Severity::Info => info!("{}", text),
            Severity::Warning => warn!("{}", text),
            Severity::Error | Severity::Critical => error!("{}", text),
        }
        Ok(())
    }
}

/// Desktop popups over the session notification bus.
pub struct DesktopChannel {
    app_name: String,
}

impl DesktopChannel {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl Channel for DesktopChannel {
    fn name(&self) -> &str {
        "desktop"
    }

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        let policy = DeliveryPolicy::for_severity(event.severity);
        let urgency = match policy.urgency {
            Urgency::Low => notify_rust::Urgency::Low,
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        };
        let timeout = match policy.timeout_ms {
            Some(ms) => notify_rust::Timeout::Milliseconds(ms),
            // Errors stay on screen until the operator dismisses them.
            None => notify_rust::Timeout::Never,
        };

        let summary = format!("{} [{}]", self.app_name, event.severity);
        let body = full_text(event);

        // The bus call is blocking.
        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(&summary)
                .body(&body)
                .urgency(urgency)
                .timeout(timeout)
                .show()
        })
        .await
        .context("desktop notification task panicked")?
        .context("failed to show desktop notification")?;
        Ok(())
    }
}

/// Pipes important events through a local sendmail binary.
///
/// Only error-grade events are mailed unless `verbose` is set.
pub struct EmailChannel {
    recipient: String,
    sendmail_path: String,
    subject_prefix: String,
    verbose: bool,
}

impl EmailChannel {
    pub fn new(
        recipient: impl Into<String>,
        sendmail_path: impl Into<String>,
        subject_prefix: impl Into<String>,
        verbose: bool,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            sendmail_path: sendmail_path.into(),
            subject_prefix: subject_prefix.into(),
            verbose,
        }
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        let policy = DeliveryPolicy::for_severity(event.severity);
        if !policy.email_eligible && !self.verbose {
            return Ok(());
        }

        let mail = format!(
            "To: {}\nSubject: {} [{}] {}\n\n{}",
            self.recipient,
            self.subject_prefix,
            event.severity,
            event.message,
            full_text(event),
        );

        let mut child = Command::new(&self.sendmail_path)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.sendmail_path))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(mail.as_bytes())
                .await
                .context("failed to write mail to sendmail")?;
        }

        let status = child.wait().await.context("failed to wait for sendmail")?;
        if !status.success() {
            bail!("sendmail exited with {}", status);
        }
        Ok(())
    }
}
