//! External collaborators: payment processor, mail delivery, event bus.

pub mod events;
pub mod mail;
pub mod payments;

pub use events::EventPublisher;
pub use mail::{LogMailer, Mailer, SmtpMailer};
pub use payments::{DisabledGateway, PaymentGateway, StripeGateway};
