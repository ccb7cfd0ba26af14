//! Notification collaborator (A7).
//!
//! Fired after a pipeline run reaches a terminal state. Per the contract
//! in §4.3/§7, a notifier can never flip a run's recorded status: `notify`
//! reports its own outcome instead of propagating an error, and the
//! caller folds it into `details.notifications` rather than failing the
//! run over it.

use async_trait::async_trait;

use crate::models::RunStatus;

/// Outcome of a single `notify` call, recorded in a run's `details` rather
/// than surfaced as a pipeline error.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NotifyOutcome {
    pub delivered: bool,
    pub error: Option<String>,
}

impl NotifyOutcome {
    fn ok() -> Self {
        Self { delivered: true, error: None }
    }

    fn skipped() -> Self {
        Self { delivered: false, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { delivered: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub operation: String,
    pub status: RunStatus,
    pub target_name: Option<String>,
    pub schedule_name: Option<String>,
    pub error_message: Option<String>,
}

impl NotificationEvent {
    fn severity(&self) -> Severity {
        match self.status {
            RunStatus::Failed => Severity::Failure,
            _ => Severity::Success,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> NotifyOutcome;
}

/// Used when no transport is configured; notifications degrade silently
/// rather than failing startup.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &NotificationEvent) -> NotifyOutcome {
        NotifyOutcome::skipped()
    }
}

/// Fans out to every configured transport. Individual transport failures
/// never propagate as an error; they're merged into the aggregate outcome
/// the caller records alongside the run.
pub struct CompositeNotifier {
    transports: Vec<Box<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new(transports: Vec<Box<dyn Notifier>>) -> Self {
        Self { transports }
    }

    pub fn noop() -> Self {
        Self { transports: vec![Box::new(NoopNotifier)] }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, event: &NotificationEvent) -> NotifyOutcome {
        let mut delivered = false;
        let mut errors = Vec::new();
        for transport in &self.transports {
            let outcome = transport.notify(event).await;
            delivered |= outcome.delivered;
            if let Some(err) = outcome.error {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            NotifyOutcome { delivered, error: None }
        } else {
            NotifyOutcome { delivered, error: Some(errors.join("; ")) }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub min_severity: Severity,
}

/// Speaks plain SMTP (`HELO`/`MAIL FROM`/`RCPT TO`/`DATA`) over a raw TCP
/// socket — no TLS/STARTTLS negotiation, matching the "minimal stub"
/// scope called out for this collaborator.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &SmtpConfig, subject: &str, body: &str) -> std::io::Result<()> {
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpStream;

        let stream = TcpStream::connect((config.host.as_str(), config.port))?;
        stream.set_read_timeout(Some(std::time::Duration::from_secs(10)))?;
        stream.set_write_timeout(Some(std::time::Duration::from_secs(10)))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        let mut line = String::new();
        reader.read_line(&mut line)?; // greeting

        writer.write_all(b"HELO localhost\r\n")?;
        line.clear();
        reader.read_line(&mut line)?;

        writer.write_all(format!("MAIL FROM:<{}>\r\n", config.from).as_bytes())?;
        line.clear();
        reader.read_line(&mut line)?;

        for rcpt in &config.to {
            writer.write_all(format!("RCPT TO:<{rcpt}>\r\n").as_bytes())?;
            line.clear();
            reader.read_line(&mut line)?;
        }

        writer.write_all(b"DATA\r\n")?;
        line.clear();
        reader.read_line(&mut line)?;

        writer.write_all(format!("Subject: {subject}\r\nTo: {}\r\n\r\n{body}\r\n.\r\n", config.to.join(", ")).as_bytes())?;
        line.clear();
        reader.read_line(&mut line)?;

        writer.write_all(b"QUIT\r\n")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, event: &NotificationEvent) -> NotifyOutcome {
        if event.severity() < self.config.min_severity {
            return NotifyOutcome::skipped();
        }
        let subject = format!("[backup] {} {:?}", event.operation, event.status);
        let body = format!(
            "operation: {}\nstatus: {:?}\ntarget: {}\nschedule: {}\nerror: {}",
            event.operation,
            event.status,
            event.target_name.as_deref().unwrap_or("-"),
            event.schedule_name.as_deref().unwrap_or("-"),
            event.error_message.as_deref().unwrap_or("-"),
        );
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || Self::send_blocking(&config, &subject, &body)).await;
        match result {
            Ok(Ok(())) => NotifyOutcome::ok(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "smtp notification failed");
                NotifyOutcome::failed(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "smtp notification task panicked");
                NotifyOutcome::failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub min_severity: Severity,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &NotificationEvent) -> NotifyOutcome {
        if event.severity() < self.config.min_severity {
            return NotifyOutcome::skipped();
        }
        let text = format!(
            "backup {} {:?} (target={}, schedule={}){}",
            event.operation,
            event.status,
            event.target_name.as_deref().unwrap_or("-"),
            event.schedule_name.as_deref().unwrap_or("-"),
            event
                .error_message
                .as_ref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default(),
        );
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.config.bot_token);
        let result = self
            .client
            .post(url)
            .json(&serde_json::json!({ "chat_id": self.config.chat_id, "text": text }))
            .send()
            .await;
        match result {
            Ok(_) => NotifyOutcome::ok(),
            Err(e) => {
                tracing::warn!(error = %e, "telegram notification failed");
                NotifyOutcome::failed(e.to_string())
            }
        }
    }
}
