use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::SmtpConfig;

use super::{Error, Notification, Notifier, Result};

/// Mails notifications through an SMTP relay.
pub struct SmtpNotifier {
    from: Mailbox,
    to: Mailbox,
    relay: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    /// Creates a notifier for the relay in `config`. No connection is made
    /// until the first notification is sent.
    ///
    /// # Errors
    ///
    /// Fails if an address cannot be parsed or the TLS setup for the relay
    /// cannot be built.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = parse_mailbox(&config.from)?;
        let to = parse_mailbox(&config.to)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(Error::Smtp)?
            .port(config.port)
            .credentials(Credentials::new(
                config.from.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build();

        Ok(Self {
            from,
            to,
            relay: format!("{}:{}", config.host, config.port),
            transport,
        })
    }
}

impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let message = compose(self.from.clone(), self.to.clone(), notification)?;
        self.transport.send(message).await.map_err(Error::Smtp)?;
        log::debug!("Mailed notification to {} via {}", self.to, self.relay);
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|source| Error::InvalidAddress {
            address: address.to_owned(),
            source,
        })
}

fn compose(from: Mailbox, to: Mailbox, notification: &Notification) -> Result<Message> {
    Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(notification.body.clone())
        .map_err(Error::Compose)
}
