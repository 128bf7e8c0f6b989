//! Mail transports.
//!
//! - [`SmtpTransport`]: delivers through an SMTP relay (`lettre`)
//! - [`StdoutTransport`]: writes the formatted message to stdout, used when
//!   no relay is configured
//! - [`RecordingTransport`]: keeps submitted messages in memory for tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::{SmtpConfig, TlsMode};

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    #[error("Could not build message: {0}")]
    Build(String),

    #[error("Could not send message: {0}")]
    Send(String),

    #[error("Invalid SMTP configuration: {0}")]
    Config(String),
}

/// A fully rendered message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub headers: BTreeMap<String, String>,
}

impl OutgoingEmail {
    /// Build the MIME message
    pub fn to_message(&self) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .to(parse_mailbox(&self.to)?)
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_HTML);

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }

        for (name, value) in &self.headers {
            let header_name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            builder = builder.raw_header(HeaderValue::new(header_name, value.clone()));
        }

        builder
            .body(self.html.clone())
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| TransportError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}

/// Mail submission backend.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;

    /// Whether submitted messages leave the process
    fn delivers_remotely(&self) -> bool {
        true
    }
}

/// SMTP relay transport
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(inner: AsyncSmtpTransport<Tokio1Executor>) -> Self {
        Self { inner }
    }

    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| TransportError::Config("smtp.host is required".to_string()))?;

        let tls_parameters = || {
            TlsParameters::new(host.to_string()).map_err(|e| TransportError::Config(e.to_string()))
        };

        let builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Required(tls_parameters()?)),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Wrapper(tls_parameters()?)),
        }
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(password)) => {
                builder.credentials(Credentials::new(user.clone(), password.clone()))
            }
            (None, None) => builder,
            _ => {
                return Err(TransportError::Config(
                    "smtp.username and smtp.password must be set together".to_string(),
                ))
            }
        };

        Ok(Self::new(builder.build()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = email.to_message()?;
        self.inner
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

/// Prints messages instead of delivering them
#[derive(Debug, Default)]
pub struct StdoutTransport;

#[async_trait]
impl MailTransport for StdoutTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = email.to_message()?;

        let mut stdout = tokio::io::stdout();
        let mut output = b"====== BEGIN MAIL ======\n".to_vec();
        output.extend_from_slice(&message.formatted());
        output.extend_from_slice(b"\n====== END MAIL ======\n");

        stdout
            .write_all(&output)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn delivers_remotely(&self) -> bool {
        false
    }
}

/// Records every submitted message; can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Send("transport unavailable".to_string()));
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
