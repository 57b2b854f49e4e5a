pub mod email_sender;
pub mod transport;

pub use email_sender::{markdown_to_html, DeliveryReport, MailSender};
pub use transport::{MailError, MailSecurity, MailTransport, MailerConfig, OutgoingMail, SmtpMailTransport};
