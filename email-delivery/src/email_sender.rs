use crate::transport::{MailError, MailTransport, OutgoingMail};
use interfaces::{retry_with_backoff, Digest, RetryError, RetryPolicy};
use pulldown_cmark::{html, Options, Parser};
use std::sync::Arc;
use tracing::{info, warn};

/// Render digest markdown as an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

/// Outcome of sending one digest to every recipient.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MailSender {
    transport: Arc<dyn MailTransport>,
    from: String,
    retry: RetryPolicy,
}

impl MailSender {
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
            retry: RetryPolicy::new(5, std::time::Duration::from_secs(2)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send one message to one recipient, retrying the whole SMTP exchange on
    /// transport failures.
    pub async fn send(&self, title: &str, body_markdown: &str, recipient: &str) -> Result<(), RetryError<MailError>> {
        let mail = OutgoingMail {
            from: self.from.clone(),
            to: recipient.to_string(),
            subject: title.to_string(),
            html_body: markdown_to_html(body_markdown),
        };

        let transport = self.transport.as_ref();
        let mail_ref = &mail;
        let operation = format!("sending email to {}", recipient);
        retry_with_backoff(
            &self.retry,
            &operation,
            move |_| transport.deliver(mail_ref),
            MailError::is_retryable,
        )
        .await?;

        info!("Email sent successfully to {}", recipient);
        Ok(())
    }

    /// Deliver `digest` to each recipient independently. A recipient whose
    /// send fails never blocks the ones after it.
    pub async fn send_digest(&self, digest: &Digest, recipients: &[String]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for recipient in recipients {
            match self.send(&digest.title, &digest.body, recipient).await {
                Ok(()) => report.delivered.push(recipient.clone()),
                Err(e) => {
                    warn!("Giving up on {}: {}", recipient, e);
                    report.failed.push(recipient.clone());
                }
            }
        }

        report
    }
}
