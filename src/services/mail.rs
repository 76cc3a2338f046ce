//! Transactional email: order confirmations, status updates, welcome mail.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::domain::aggregates::{Order, OrderStatus};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), MailError>;
}

/// SMTP delivery through a STARTTLS relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// # Errors
    ///
    /// Returns error if the relay host cannot be resolved into a transport.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(config.username.clone(), config.password.expose_secret().to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();
        Ok(Self { transport, from_address: config.from_address.clone() })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from_address.parse().map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?)
            .to(to.parse().map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        self.transport.send(email).await?;
        tracing::info!(to = %to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Writes mail to the log instead of delivering it. Used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), MailError> {
        tracing::info!(to = %to, subject = %message.subject, "Email delivery disabled; message logged");
        tracing::debug!(body = %message.body);
        Ok(())
    }
}

/// Sends without failing the caller; delivery problems only get logged.
pub async fn deliver(mailer: &dyn Mailer, to: &str, message: EmailMessage) {
    if let Err(e) = mailer.send(to, &message).await {
        tracing::warn!(to = %to, subject = %message.subject, error = %e, "Email delivery failed");
    }
}

pub fn welcome(name: &str) -> EmailMessage {
    EmailMessage {
        subject: "Welcome to the store".to_string(),
        body: format!("Hi {name},\n\nYour account is ready. Happy shopping!\n"),
    }
}

pub fn order_confirmation(order: &Order) -> EmailMessage {
    let mut body = format!("Thanks for your order {}.\n\n", order.order_number);
    for item in &order.items {
        body.push_str(&format!("  {} x {} @ {} = {}\n", item.quantity, item.name, item.unit_price, item.line_total));
    }
    let t = &order.totals;
    body.push_str(&format!(
        "\nSubtotal: {}\nDiscount: -{}\nShipping: {}\nTax: {}\nTotal: {}\n",
        t.subtotal, t.discount, t.shipping, t.tax, t.total
    ));
    let a = &order.shipping_address;
    body.push_str(&format!("\nShipping to:\n  {}\n  {}\n  {} {}\n  {}\n", a.full_name, a.street, a.city, a.postal_code, a.country));
    EmailMessage { subject: format!("Order {} confirmed", order.order_number), body }
}

pub fn status_update(order: &Order) -> EmailMessage {
    let detail = match order.status {
        OrderStatus::Pending => "has been received".to_string(),
        OrderStatus::Processing => "is being prepared".to_string(),
        OrderStatus::Shipped => match &order.tracking_number {
            Some(n) => format!("has shipped (tracking number {n})"),
            None => "has shipped".to_string(),
        },
        OrderStatus::Delivered => "has been delivered".to_string(),
        OrderStatus::Cancelled => "has been cancelled".to_string(),
    };
    EmailMessage {
        subject: format!("Order {} is {}", order.order_number, order.status),
        body: format!("Your order {} {detail}.\n", order.order_number),
    }
}
