//! Payment-customer records and saved payment methods.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::gateway::{NewCustomer, PaymentGateway, PaymentMethodSummary, SetupIntent};
use crate::models::{PaymentCustomer, User};
use crate::store::Store;
use crate::utils::{AppError, AppResult};

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// The user's customer record, created at the gateway on first use.
    pub async fn ensure_customer(
        &self,
        user: &User,
        payment_method_id: Option<&str>,
    ) -> AppResult<PaymentCustomer> {
        if let Some(customer) = self.store.find_payment_customer_by_user(user.id).await? {
            return Ok(customer);
        }

        let customer_id = self
            .gateway
            .create_customer(NewCustomer {
                user_id: user.id,
                email: &user.email,
                name: &user.name,
                payment_method_id,
            })
            .await?;
        info!(user_id = %user.id, customer_id = %customer_id, "Payment customer created");

        // A concurrent first payment may have linked another customer; the
        // stored link wins.
        Ok(self
            .store
            .insert_payment_customer(user.id, &customer_id, payment_method_id)
            .await?)
    }

    pub async fn create_setup_intent(&self, user: &User) -> AppResult<SetupIntent> {
        let customer = self.ensure_customer(user, None).await?;
        Ok(self
            .gateway
            .create_setup_intent(&customer.customer_id, user.id)
            .await?)
    }

    pub async fn list_payment_methods(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<PaymentMethodSummary>> {
        match self.store.find_payment_customer_by_user(user_id).await? {
            Some(customer) => Ok(self
                .gateway
                .list_payment_methods(&customer.customer_id)
                .await?),
            None => Ok(Vec::new()),
        }
    }

    /// Detaches a saved method, which must belong to the user.
    pub async fn detach_payment_method(
        &self,
        user_id: Uuid,
        payment_method_id: &str,
    ) -> AppResult<()> {
        let owned = self
            .list_payment_methods(user_id)
            .await?
            .iter()
            .any(|m| m.id == payment_method_id);
        if !owned {
            return Err(AppError::NotFound("Payment method not found".to_string()));
        }

        self.gateway.detach_payment_method(payment_method_id).await?;
        info!(%user_id, payment_method_id, "Payment method detached");
        Ok(())
    }
}
