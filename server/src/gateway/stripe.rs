//! Stripe integration via REST API (no SDK dependency).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use super::{
    webhook, GatewayError, GatewayResult, NewCustomer, PaymentGateway, PaymentMethodSummary,
    PaymentOutcome, PaymentRequest, PaymentStatus, SetupIntent, WebhookEvent,
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

pub struct StripeGateway {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> GatewayResult<Value> {
        let mut request = self.client.post(self.url(path)).form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        self.send(request).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> GatewayResult<Value> {
        self.send(self.client.get(self.url(path)).query(query)).await
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Value> {
        let response = request
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(transport_error)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(api_error(status, &body))
        }
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

fn api_error(status: StatusCode, body: &Value) -> GatewayError {
    let error = &body["error"];
    let message = error["message"]
        .as_str()
        .unwrap_or("unexpected response")
        .to_string();

    if status == StatusCode::PAYMENT_REQUIRED || error["type"].as_str() == Some("card_error") {
        let reason = error["decline_code"]
            .as_str()
            .or_else(|| error["code"].as_str())
            .unwrap_or(&message)
            .to_string();
        return GatewayError::Declined { reason };
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::Unavailable(message);
    }

    GatewayError::Api(message)
}

fn payment_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Succeeded,
        "canceled" => PaymentStatus::Canceled,
        "requires_payment_method" => PaymentStatus::Failed,
        _ => PaymentStatus::Processing,
    }
}

fn required_str(body: &Value, field: &str) -> GatewayResult<String> {
    body[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| GatewayError::Api(format!("response without {field}: {body}")))
}

fn payment_outcome(body: &Value) -> GatewayResult<PaymentOutcome> {
    Ok(PaymentOutcome {
        transaction_id: required_str(body, "id")?,
        status: payment_status(body["status"].as_str().unwrap_or_default()),
    })
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(&self, customer: NewCustomer<'_>) -> GatewayResult<String> {
        let mut form = vec![
            ("email", customer.email.to_string()),
            ("name", customer.name.to_string()),
            ("metadata[user_id]", customer.user_id.to_string()),
        ];
        if let Some(pm) = customer.payment_method_id {
            form.push(("payment_method", pm.to_string()));
            form.push(("invoice_settings[default_payment_method]", pm.to_string()));
        }

        let body = self.post("customers", &form, None).await?;
        required_str(&body, "id")
    }

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        user_id: Uuid,
    ) -> GatewayResult<SetupIntent> {
        let form = [
            ("customer", customer_id.to_string()),
            ("payment_method_types[]", "card".to_string()),
            ("usage", "off_session".to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        let body = self.post("setup_intents", &form, None).await?;
        Ok(SetupIntent {
            id: required_str(&body, "id")?,
            client_secret: body["client_secret"].as_str().map(String::from),
            customer_id: customer_id.to_string(),
        })
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentOutcome> {
        let form = [
            ("amount", request.amount.to_string()),
            ("currency", request.currency.clone()),
            ("customer", request.customer_id.clone()),
            ("payment_method", request.payment_method_id.clone()),
            ("off_session", "true".to_string()),
            ("confirm", "true".to_string()),
            ("description", request.description.clone()),
            ("metadata[ticket_id]", request.ticket_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        // Replaying the same ticket id returns the original intent.
        let key = request.ticket_id.to_string();
        let body = self.post("payment_intents", &form, Some(&key)).await?;
        payment_outcome(&body)
    }

    async fn retrieve_payment(&self, transaction_id: &str) -> GatewayResult<PaymentOutcome> {
        let body = self
            .get(&format!("payment_intents/{transaction_id}"), &[])
            .await?;
        payment_outcome(&body)
    }

    async fn cancel_payment(&self, transaction_id: &str) -> GatewayResult<()> {
        self.post(&format!("payment_intents/{transaction_id}/cancel"), &[], None)
            .await?;
        Ok(())
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult<String> {
        let form = [
            ("payment_intent", transaction_id.to_string()),
            ("amount", amount.to_string()),
        ];
        let key = format!("refund-{transaction_id}");
        let body = self.post("refunds", &form, Some(&key)).await?;

        match body["status"].as_str() {
            Some("failed") | Some("canceled") => Err(GatewayError::Api(format!(
                "refund {} did not complete",
                body["id"].as_str().unwrap_or_default()
            ))),
            _ => required_str(&body, "id"),
        }
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> GatewayResult<Vec<PaymentMethodSummary>> {
        let body = self
            .get("payment_methods", &[("customer", customer_id), ("type", "card")])
            .await?;

        let methods = body["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|pm| {
                        let card = &pm["card"];
                        Some(PaymentMethodSummary {
                            id: pm["id"].as_str()?.to_string(),
                            brand: card["brand"].as_str().map(String::from),
                            last4: card["last4"].as_str().map(String::from),
                            exp_month: card["exp_month"].as_i64(),
                            exp_year: card["exp_year"].as_i64(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(methods)
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> GatewayResult<()> {
        self.post(
            &format!("payment_methods/{payment_method_id}/detach"),
            &[],
            None,
        )
        .await?;
        Ok(())
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<WebhookEvent> {
        webhook::verify(payload, signature, &self.webhook_secret)?;
        webhook::parse_event(payload)
    }
}
