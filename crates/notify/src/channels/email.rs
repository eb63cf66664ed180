//! SMTP email notifier via `lettre`.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Port 465 uses implicit TLS; everything else STARTTLS.
    pub fn from_config(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self, NotifyError> {
        let from: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotifyError::Config(e.to_string()))?
            .port(port);
        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        let to: Mailbox = notification
            .recipient
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                NotifyError::Rejected(format!("bad recipient address: {e}"))
            })?;

        // Stamp our own message id so the receipt is stable even when
        // the relay does not echo one back.
        let message_id = format!("<{}@vigil>", Uuid::new_v4());
        let email = Message::builder()
            .message_id(Some(message_id.clone()))
            .from(self.from.clone())
            .to(to)
            .subject(&notification.subject)
            .body(notification.content.clone())
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        Ok(ProviderReceipt::sent(message_id))
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}
