use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Link between a user and their customer record at the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentCustomer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_id: String,
    pub payment_method_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
