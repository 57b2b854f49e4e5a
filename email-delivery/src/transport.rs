use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the SMTP session is secured. `None` is a plaintext session followed
/// by an authenticated login, the classic port-25 submission setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailSecurity {
    #[default]
    None,
    StartTls,
    Tls,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Mail configuration error: {0}")]
    Config(String),
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        MailError::Transport(e.to_string())
    }
}

impl MailError {
    /// Only transport failures are worth another attempt. Authentication
    /// failures surface as transport errors too and are retried the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Transport(_))
    }
}

#[derive(Clone)]
pub struct MailerConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: MailSecurity,
}

impl MailerConfig {
    pub fn new(server: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: 25,
            username: username.into(),
            password: password.into(),
            security: MailSecurity::None,
        }
    }
}

impl std::fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("security", &self.security)
            .finish()
    }
}

/// A fully rendered message for a single recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl OutgoingMail {
    pub fn to_message(&self) -> Result<Message, MailError> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(self.to.parse()?)
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(self.html_body.clone())?;
        Ok(message)
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// SMTP submission via lettre. Connections are pooled by the transport and
/// reused across deliveries.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(config: &MailerConfig) -> Result<Self, MailError> {
        if config.server.is_empty() {
            return Err(MailError::Config("No SMTP server configured".to_string()));
        }

        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let builder = match config.security {
            MailSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server),
            MailSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?,
            MailSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?,
        };

        let mailer = builder.port(config.port).credentials(credentials).build();
        Ok(Self { mailer })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = mail.to_message()?;
        let response = self.mailer.send(message).await?;
        debug!("SMTP server answered {} for {}", response.code(), mail.to);
        Ok(())
    }
}
