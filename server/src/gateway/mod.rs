//! Payment processor boundary.
//!
//! Services talk to the processor only through [`PaymentGateway`]; the
//! process holds one instance (Stripe in production, [`MockGateway`] in
//! tests and local runs) behind an `Arc`.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod mock;
pub mod stripe;
pub mod webhook;

pub use mock::{MockGateway, PaymentScript};
pub use stripe::StripeGateway;
pub use webhook::{WebhookEvent, WebhookEventKind};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The processor refused the charge; nothing was captured.
    #[error("payment declined: {reason}")]
    Declined { reason: String },

    /// No answer in time. The outcome is unknown.
    #[error("payment gateway timed out")]
    Timeout,

    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The processor answered with a definitive error.
    #[error("payment gateway error: {0}")]
    Api(String),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    /// Whether the processor may still have acted on the request.
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Unavailable(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Succeeded,
    /// Accepted but not settled yet; a webhook will follow.
    Processing,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub transaction_id: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Also the idempotency key of the charge.
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub customer_id: String,
    pub payment_method_id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub name: &'a str,
    pub payment_method_id: Option<&'a str>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub customer_id: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentMethodSummary {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i64>,
    pub exp_year: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the processor's customer id.
    async fn create_customer(&self, customer: NewCustomer<'_>) -> GatewayResult<String>;

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        user_id: Uuid,
    ) -> GatewayResult<SetupIntent>;

    /// Confirms an off-session charge. A refused card is
    /// [`GatewayError::Declined`].
    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentOutcome>;

    async fn retrieve_payment(&self, transaction_id: &str) -> GatewayResult<PaymentOutcome>;

    /// Voids a payment that has not settled.
    async fn cancel_payment(&self, transaction_id: &str) -> GatewayResult<()>;

    /// Full or partial refund of a settled payment; returns the refund id.
    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult<String>;

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> GatewayResult<Vec<PaymentMethodSummary>>;

    async fn detach_payment_method(&self, payment_method_id: &str) -> GatewayResult<()>;

    /// Verifies the signature header and decodes the event.
    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<WebhookEvent>;
}
