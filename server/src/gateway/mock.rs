//! In-process gateway with scriptable outcomes.
//!
//! Used by the test-suite and by `PAYMENT_GATEWAY=mock` for local runs.
//! Every call is recorded so tests can assert on what the services asked
//! the processor to do.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    webhook, GatewayError, GatewayResult, NewCustomer, PaymentGateway, PaymentMethodSummary,
    PaymentOutcome, PaymentRequest, PaymentStatus, SetupIntent, WebhookEvent,
};

pub const DEFAULT_WEBHOOK_SECRET: &str = "whsec_mock";

/// What the next `create_payment` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentScript {
    Succeed,
    Processing,
    Decline(String),
    /// The intent is created but the caller sees a timeout.
    Timeout,
    /// A definitive processor error; no intent is created.
    Fail(String),
    /// Never answers.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateCustomer { user_id: Uuid },
    CreateSetupIntent { customer_id: String },
    CreatePayment { ticket_id: Uuid, amount: i64 },
    RetrievePayment { transaction_id: String },
    CancelPayment { transaction_id: String },
    Refund { transaction_id: String, amount: i64 },
    ListPaymentMethods { customer_id: String },
    DetachPaymentMethod { payment_method_id: String },
}

#[derive(Debug, Clone)]
struct MockPayment {
    status: PaymentStatus,
    amount: i64,
    refunded: i64,
}

#[derive(Debug)]
struct MockState {
    default_script: PaymentScript,
    scripts: VecDeque<PaymentScript>,
    payments: HashMap<String, MockPayment>,
    by_ticket: HashMap<Uuid, String>,
    payment_methods: HashMap<String, Vec<PaymentMethodSummary>>,
    fail_refunds: bool,
    fail_cancels: bool,
    calls: Vec<GatewayCall>,
    sequence: u64,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}_mock_{}", self.sequence)
    }
}

pub struct MockGateway {
    state: Mutex<MockState>,
    webhook_secret: String,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(DEFAULT_WEBHOOK_SECRET)
    }
}

impl MockGateway {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                default_script: PaymentScript::Succeed,
                scripts: VecDeque::new(),
                payments: HashMap::new(),
                by_ticket: HashMap::new(),
                payment_methods: HashMap::new(),
                fail_refunds: false,
                fail_cancels: false,
                calls: Vec::new(),
                sequence: 0,
            }),
            webhook_secret: webhook_secret.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an outcome for the next payment; queued scripts run before
    /// the default.
    pub fn script_payment(&self, script: PaymentScript) {
        self.state().scripts.push_back(script);
    }

    pub fn set_default_payment(&self, script: PaymentScript) {
        self.state().default_script = script;
    }

    /// Overrides what `retrieve_payment` reports for a transaction.
    pub fn set_payment_status(&self, transaction_id: &str, status: PaymentStatus) {
        let mut state = self.state();
        if let Some(payment) = state.payments.get_mut(transaction_id) {
            payment.status = status;
        }
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.state().fail_refunds = fail;
    }

    pub fn fail_cancels(&self, fail: bool) {
        self.state().fail_cancels = fail;
    }

    pub fn add_payment_method(&self, customer_id: &str, method: PaymentMethodSummary) {
        self.state()
            .payment_methods
            .entry(customer_id.to_string())
            .or_default()
            .push(method);
    }

    pub fn transaction_for_ticket(&self, ticket_id: Uuid) -> Option<String> {
        self.state().by_ticket.get(&ticket_id).cloned()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Refund {
                    transaction_id,
                    amount,
                } => Some((transaction_id, amount)),
                _ => None,
            })
            .collect()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::CancelPayment { transaction_id } => Some(transaction_id),
                _ => None,
            })
            .collect()
    }

    /// Signature header for `payload`, as the processor would send it.
    pub fn sign(&self, payload: &[u8]) -> GatewayResult<String> {
        webhook::sign(payload, &self.webhook_secret, chrono::Utc::now().timestamp())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(&self, customer: NewCustomer<'_>) -> GatewayResult<String> {
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateCustomer {
            user_id: customer.user_id,
        });
        let id = state.next_id("cus");
        if let Some(pm) = customer.payment_method_id {
            state
                .payment_methods
                .entry(id.clone())
                .or_default()
                .push(PaymentMethodSummary {
                    id: pm.to_string(),
                    brand: Some("visa".to_string()),
                    last4: Some("4242".to_string()),
                    exp_month: None,
                    exp_year: None,
                });
        }
        Ok(id)
    }

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        _user_id: Uuid,
    ) -> GatewayResult<SetupIntent> {
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateSetupIntent {
            customer_id: customer_id.to_string(),
        });
        let id = state.next_id("seti");
        Ok(SetupIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            customer_id: customer_id.to_string(),
        })
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentOutcome> {
        let script = {
            let mut state = self.state();
            state.calls.push(GatewayCall::CreatePayment {
                ticket_id: request.ticket_id,
                amount: request.amount,
            });

            if let Some(existing) = state.by_ticket.get(&request.ticket_id).cloned() {
                let status = state.payments[&existing].status;
                return Ok(PaymentOutcome {
                    transaction_id: existing,
                    status,
                });
            }

            let script = state
                .scripts
                .pop_front()
                .unwrap_or_else(|| state.default_script.clone());

            let status = match &script {
                PaymentScript::Succeed => Some(PaymentStatus::Succeeded),
                PaymentScript::Processing | PaymentScript::Timeout | PaymentScript::Hang => {
                    Some(PaymentStatus::Processing)
                }
                PaymentScript::Decline(_) | PaymentScript::Fail(_) => None,
            };

            match status {
                Some(status) => {
                    let transaction_id = state.next_id("pi");
                    state.payments.insert(
                        transaction_id.clone(),
                        MockPayment {
                            status,
                            amount: request.amount,
                            refunded: 0,
                        },
                    );
                    state
                        .by_ticket
                        .insert(request.ticket_id, transaction_id.clone());
                    (script, Some(PaymentOutcome {
                        transaction_id,
                        status,
                    }))
                }
                None => (script, None),
            }
        };

        match script {
            (PaymentScript::Decline(reason), _) => Err(GatewayError::Declined { reason }),
            (PaymentScript::Fail(message), _) => Err(GatewayError::Api(message)),
            (PaymentScript::Timeout, _) => Err(GatewayError::Timeout),
            (PaymentScript::Hang, _) => {
                std::future::pending::<()>().await;
                Err(GatewayError::Timeout)
            }
            (_, Some(outcome)) => Ok(outcome),
            (_, None) => Err(GatewayError::Api("no payment recorded".to_string())),
        }
    }

    async fn retrieve_payment(&self, transaction_id: &str) -> GatewayResult<PaymentOutcome> {
        let mut state = self.state();
        state.calls.push(GatewayCall::RetrievePayment {
            transaction_id: transaction_id.to_string(),
        });
        state
            .payments
            .get(transaction_id)
            .map(|payment| PaymentOutcome {
                transaction_id: transaction_id.to_string(),
                status: payment.status,
            })
            .ok_or_else(|| GatewayError::Api(format!("No such payment: {transaction_id}")))
    }

    async fn cancel_payment(&self, transaction_id: &str) -> GatewayResult<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::CancelPayment {
            transaction_id: transaction_id.to_string(),
        });
        if state.fail_cancels {
            return Err(GatewayError::Unavailable("cancel failed".to_string()));
        }
        match state.payments.get_mut(transaction_id) {
            Some(payment) if payment.status == PaymentStatus::Succeeded => Err(GatewayError::Api(
                "payment has already succeeded".to_string(),
            )),
            Some(payment) => {
                payment.status = PaymentStatus::Canceled;
                Ok(())
            }
            None => Err(GatewayError::Api(format!(
                "No such payment: {transaction_id}"
            ))),
        }
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult<String> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Refund {
            transaction_id: transaction_id.to_string(),
            amount,
        });
        if state.fail_refunds {
            return Err(GatewayError::Api("refund failed".to_string()));
        }
        match state.payments.get_mut(transaction_id) {
            Some(payment) if payment.status == PaymentStatus::Succeeded => {
                if payment.refunded >= payment.amount {
                    return Err(GatewayError::Api(
                        "charge has already been refunded".to_string(),
                    ));
                }
                if amount > payment.amount - payment.refunded {
                    return Err(GatewayError::Api(
                        "refund exceeds captured amount".to_string(),
                    ));
                }
                payment.refunded += amount;
                Ok(state.next_id("re"))
            }
            Some(_) => Err(GatewayError::Api("payment has not succeeded".to_string())),
            None => Err(GatewayError::Api(format!(
                "No such payment: {transaction_id}"
            ))),
        }
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> GatewayResult<Vec<PaymentMethodSummary>> {
        let mut state = self.state();
        state.calls.push(GatewayCall::ListPaymentMethods {
            customer_id: customer_id.to_string(),
        });
        Ok(state
            .payment_methods
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> GatewayResult<()> {
        let mut state = self.state();
        state.calls.push(GatewayCall::DetachPaymentMethod {
            payment_method_id: payment_method_id.to_string(),
        });
        let mut found = false;
        for methods in state.payment_methods.values_mut() {
            let before = methods.len();
            methods.retain(|m| m.id != payment_method_id);
            found |= methods.len() != before;
        }
        if found {
            Ok(())
        } else {
            Err(GatewayError::Api(format!(
                "No such payment method: {payment_method_id}"
            )))
        }
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<WebhookEvent> {
        webhook::verify(payload, signature, &self.webhook_secret)?;
        webhook::parse_event(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ticket_id: Uuid) -> PaymentRequest {
        PaymentRequest {
            ticket_id,
            user_id: Uuid::new_v4(),
            amount: 50_000,
            currency: "idr".to_string(),
            customer_id: "cus_mock_1".to_string(),
            payment_method_id: "pm_card_visa".to_string(),
            description: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripts_run_in_order_then_default() {
        let gateway = MockGateway::default();
        gateway.script_payment(PaymentScript::Decline("card_declined".into()));

        let err = gateway.create_payment(&request(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, GatewayError::Declined { .. }));

        let ok = gateway.create_payment(&request(Uuid::new_v4())).await.unwrap();
        assert_eq!(ok.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_same_ticket_returns_same_intent() {
        let gateway = MockGateway::default();
        let ticket_id = Uuid::new_v4();
        let first = gateway.create_payment(&request(ticket_id)).await.unwrap();
        let second = gateway.create_payment(&request(ticket_id)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_timeout_leaves_processing_intent() {
        let gateway = MockGateway::default();
        gateway.script_payment(PaymentScript::Timeout);
        let ticket_id = Uuid::new_v4();

        let err = gateway.create_payment(&request(ticket_id)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));

        let tx = gateway.transaction_for_ticket(ticket_id).unwrap();
        let outcome = gateway.retrieve_payment(&tx).await.unwrap();
        assert_eq!(outcome.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_refund_failure_mode() {
        let gateway = MockGateway::default();
        let outcome = gateway.create_payment(&request(Uuid::new_v4())).await.unwrap();

        gateway.fail_refunds(true);
        assert!(gateway.refund(&outcome.transaction_id, 50_000).await.is_err());

        gateway.fail_refunds(false);
        assert!(gateway.refund(&outcome.transaction_id, 50_000).await.is_ok());
        assert_eq!(gateway.refunds().len(), 2);
    }

    #[tokio::test]
    async fn test_payment_is_refunded_at_most_once() {
        let gateway = MockGateway::default();
        let outcome = gateway.create_payment(&request(Uuid::new_v4())).await.unwrap();

        assert!(gateway.refund(&outcome.transaction_id, 50_000).await.is_ok());
        let err = gateway
            .refund(&outcome.transaction_id, 50_000)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api(msg) if msg.contains("already been refunded")));
    }

    #[test]
    fn test_signed_events_parse() {
        let gateway = MockGateway::default();
        let payload = br#"{"id":"evt_1","type":"customer.created","data":{"object":{}}}"#;
        let header = gateway.sign(payload).unwrap();
        let event = gateway.parse_webhook(payload, &header).unwrap();
        assert_eq!(event.id, "evt_1");
        assert!(gateway.parse_webhook(payload, "t=1,v1=00").is_err());
    }
}
