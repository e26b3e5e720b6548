mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cinema_server::gateway::{
    GatewayResult, MockGateway, NewCustomer, PaymentGateway, PaymentMethodSummary,
    PaymentOutcome, PaymentRequest, PaymentScript, PaymentStatus, SetupIntent, WebhookEvent,
};
use cinema_server::models::{PageRequest, TicketStatus, TicketTransition};
use cinema_server::services::booking::BookingPaymentStatus;
use cinema_server::services::{BookingService, BookingSettings, PendingSweeper};
use cinema_server::store::{MemoryStore, TicketStore};
use cinema_server::utils::AppError;
use rust_decimal::Decimal;
use uuid::Uuid;

use common::Fixture;

#[tokio::test]
async fn test_successful_booking_confirms_ticket() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;
    let seat = &showing.seats[0];

    let outcome = fx.book(user.id, showing.schedule.id, seat.id).await.unwrap();

    assert_eq!(outcome.ticket.status, TicketStatus::Confirmed);
    assert_eq!(outcome.payment_status, BookingPaymentStatus::Succeeded);
    assert_eq!(outcome.ticket.price, Decimal::from(50_000));
    assert!(outcome.ticket.ticket_number.starts_with("TIX-"));
    assert_eq!(
        outcome.ticket.payment_ref,
        fx.gateway.transaction_for_ticket(outcome.ticket.id)
    );
    assert!(outcome.ticket.payment_customer_id.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_of_one_seat_admit_exactly_one() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let seat_id = showing.seats[0].id;

    let mut users = Vec::new();
    for i in 0..10 {
        users.push(fx.user(&format!("user{i}@example.com")).await);
    }

    let state = Arc::new(fx.state.clone());
    let handles: Vec<_> = users
        .into_iter()
        .map(|user| {
            let state = state.clone();
            let schedule_id = showing.schedule.id;
            tokio::spawn(async move {
                state
                    .booking
                    .create_ticket(
                        user.id,
                        cinema_server::services::booking::CreateTicket {
                            schedule_id,
                            seat_id,
                            payment_method_id: common::PAYMENT_METHOD.to_string(),
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut booked = 0;
    let mut taken = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(AppError::SeatTaken) => taken += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(booked, 1);
    assert_eq!(taken, 9);
    assert!(fx
        .store
        .active_ticket_exists(showing.schedule.id, seat_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_declined_payment_releases_the_seat() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let ana = fx.user("ana@example.com").await;
    let ben = fx.user("ben@example.com").await;
    let seat = &showing.seats[0];

    fx.gateway
        .script_payment(PaymentScript::Decline("card_declined".to_string()));
    let err = fx.book(ana.id, showing.schedule.id, seat.id).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentDeclined(ref reason) if reason == "card_declined"));

    let tickets = fx
        .state
        .booking
        .list_user_tickets(ana.id, None, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(tickets.items.len(), 1);
    assert_eq!(tickets.items[0].status, TicketStatus::Canceled);

    let outcome = fx.book(ben.id, showing.schedule.id, seat.id).await.unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Confirmed);
}

#[tokio::test]
async fn test_processor_error_releases_the_seat() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;
    let seat = &showing.seats[0];

    fx.gateway
        .script_payment(PaymentScript::Fail("invalid currency".to_string()));
    let err = fx.book(user.id, showing.schedule.id, seat.id).await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT_SYSTEM_ERROR");
    assert!(!fx
        .store
        .active_ticket_exists(showing.schedule.id, seat.id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_payment_timeout_keeps_ticket_pending() {
    let fx = Fixture::with_settings(BookingSettings {
        payment_timeout: Duration::from_millis(50),
        ..BookingSettings::default()
    });
    let showing = fx.showing().await;
    let ana = fx.user("ana@example.com").await;
    let ben = fx.user("ben@example.com").await;
    let seat = &showing.seats[0];

    fx.gateway.script_payment(PaymentScript::Hang);
    let outcome = fx.book(ana.id, showing.schedule.id, seat.id).await.unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Pending);
    assert_eq!(outcome.payment_status, BookingPaymentStatus::Unknown);
    assert!(outcome.ticket.payment_ref.is_none());

    let err = fx.book(ben.id, showing.schedule.id, seat.id).await.unwrap_err();
    assert!(matches!(err, AppError::SeatTaken));
}

#[tokio::test]
async fn test_gateway_timeout_error_is_an_unknown_outcome() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    fx.gateway.script_payment(PaymentScript::Timeout);
    let outcome = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Pending);
    assert_eq!(outcome.payment_status, BookingPaymentStatus::Unknown);
}

#[tokio::test]
async fn test_processing_payment_leaves_ticket_pending_with_reference() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    fx.gateway.script_payment(PaymentScript::Processing);
    let outcome = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Pending);
    assert_eq!(outcome.payment_status, BookingPaymentStatus::Processing);
    assert!(outcome.ticket.payment_ref.is_some());
}

#[tokio::test]
async fn test_seat_from_another_theater_is_rejected() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let (_, other_seats) = fx.theater(1).await;
    let user = fx.user("ana@example.com").await;

    let err = fx
        .book(user.id, showing.schedule.id, other_seats[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
    assert!(fx.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_pending_voids_without_refund() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    fx.gateway.script_payment(PaymentScript::Processing);
    let booked = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();
    let transaction_id = booked.ticket.payment_ref.clone().unwrap();

    let canceled = fx
        .state
        .booking
        .cancel_ticket(user.id, booked.ticket.id)
        .await
        .unwrap();

    assert_eq!(canceled.ticket.status, TicketStatus::Canceled);
    assert!(canceled.refund_id.is_none());
    assert_eq!(fx.gateway.cancellations(), vec![transaction_id]);
    assert!(fx.gateway.refunds().is_empty());
}

#[tokio::test]
async fn test_cancel_confirmed_refunds_full_price() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    let booked = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();
    let transaction_id = booked.ticket.payment_ref.clone().unwrap();

    let canceled = fx
        .state
        .booking
        .cancel_ticket(user.id, booked.ticket.id)
        .await
        .unwrap();

    assert_eq!(canceled.ticket.status, TicketStatus::Canceled);
    assert!(canceled.refund_id.is_some());
    assert_eq!(fx.gateway.refunds(), vec![(transaction_id, 50_000)]);

    let err = fx
        .state
        .booking
        .cancel_ticket(user.id, booked.ticket.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCanceled));
}

#[tokio::test]
async fn test_failed_refund_keeps_ticket_confirmed() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    let booked = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();

    fx.gateway.fail_refunds(true);
    let err = fx
        .state
        .booking
        .cancel_ticket(user.id, booked.ticket.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PAYMENT_SYSTEM_ERROR");

    let ticket = fx.store.find_ticket(booked.ticket.id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Confirmed);
}

/// Checks the ticket in while its refund is in flight.
struct CheckInDuringRefund {
    inner: Arc<MockGateway>,
    store: Arc<MemoryStore>,
}

#[async_trait]
impl PaymentGateway for CheckInDuringRefund {
    async fn create_customer(&self, customer: NewCustomer<'_>) -> GatewayResult<String> {
        self.inner.create_customer(customer).await
    }

    async fn create_setup_intent(
        &self,
        customer_id: &str,
        user_id: Uuid,
    ) -> GatewayResult<SetupIntent> {
        self.inner.create_setup_intent(customer_id, user_id).await
    }

    async fn create_payment(&self, request: &PaymentRequest) -> GatewayResult<PaymentOutcome> {
        self.inner.create_payment(request).await
    }

    async fn retrieve_payment(&self, transaction_id: &str) -> GatewayResult<PaymentOutcome> {
        self.inner.retrieve_payment(transaction_id).await
    }

    async fn cancel_payment(&self, transaction_id: &str) -> GatewayResult<()> {
        self.inner.cancel_payment(transaction_id).await
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> GatewayResult<String> {
        let refund_id = self.inner.refund(transaction_id, amount).await?;
        let ticket = self
            .store
            .find_ticket_by_payment_ref(transaction_id)
            .await
            .unwrap()
            .unwrap();
        self.store
            .transition_ticket(
                ticket.id,
                TicketTransition::new(TicketStatus::Confirmed, TicketStatus::Used),
            )
            .await
            .unwrap()
            .unwrap();
        Ok(refund_id)
    }

    async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> GatewayResult<Vec<PaymentMethodSummary>> {
        self.inner.list_payment_methods(customer_id).await
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> GatewayResult<()> {
        self.inner.detach_payment_method(payment_method_id).await
    }

    fn parse_webhook(&self, payload: &[u8], signature: &str) -> GatewayResult<WebhookEvent> {
        self.inner.parse_webhook(payload, signature)
    }
}

#[tokio::test]
async fn test_check_in_during_refund_is_reported() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    let booked = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap()
        .ticket;

    let booking = BookingService::new(
        fx.store.clone(),
        Arc::new(CheckInDuringRefund {
            inner: fx.gateway.clone(),
            store: fx.store.clone(),
        }),
        BookingSettings::default(),
    );
    let err = booking.cancel_ticket(user.id, booked.id).await.unwrap_err();
    assert_eq!(err.code(), "PAYMENT_SYSTEM_ERROR");
    assert!(err.to_string().contains("re_mock_"));

    let ticket = fx.store.find_ticket(booked.id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Used);
    assert!(ticket.refund_ref.is_some());
    assert_eq!(fx.gateway.refunds().len(), 1);
}

#[tokio::test]
async fn test_cancel_of_someone_elses_ticket_is_not_found() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let ana = fx.user("ana@example.com").await;
    let ben = fx.user("ben@example.com").await;

    let booked = fx
        .book(ana.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap();
    let err = fx
        .state
        .booking
        .cancel_ticket(ben.id, booked.ticket.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_validation_walks_the_lifecycle() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;
    let booking = &fx.state.booking;

    let confirmed = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap()
        .ticket;
    let used = booking
        .validate_ticket(&confirmed.ticket_number)
        .await
        .unwrap();
    assert_eq!(used.status, TicketStatus::Used);
    assert!(matches!(
        booking.validate_ticket(&confirmed.ticket_number).await,
        Err(AppError::AlreadyUsed)
    ));

    fx.gateway.script_payment(PaymentScript::Processing);
    let pending = fx
        .book(user.id, showing.schedule.id, showing.seats[1].id)
        .await
        .unwrap()
        .ticket;
    assert!(matches!(
        booking.validate_ticket(&pending.ticket_number).await,
        Err(AppError::InvalidState(_))
    ));

    booking.cancel_ticket(user.id, pending.id).await.unwrap();
    assert!(matches!(
        booking.validate_ticket(&pending.ticket_number).await,
        Err(AppError::AlreadyCanceled)
    ));

    assert!(matches!(
        booking.validate_ticket("TIX-0-NOPE00").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_sweeper_resolves_stale_pending_tickets() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    fx.gateway.set_default_payment(PaymentScript::Processing);
    let settled = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap()
        .ticket;
    let stuck = fx
        .book(user.id, showing.schedule.id, showing.seats[1].id)
        .await
        .unwrap()
        .ticket;
    fx.gateway.script_payment(PaymentScript::Timeout);
    let unknown = fx
        .book(user.id, showing.schedule.id, showing.seats[2].id)
        .await
        .unwrap()
        .ticket;

    fx.gateway.set_payment_status(
        settled.payment_ref.as_deref().unwrap(),
        PaymentStatus::Succeeded,
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    let sweeper = PendingSweeper::new(
        fx.store.clone(),
        fx.gateway.clone(),
        Duration::ZERO,
        Duration::from_secs(60),
    );
    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.canceled, 2);
    assert_eq!(report.skipped, 0);

    let status = |id: uuid::Uuid| {
        let store = fx.store.clone();
        async move { store.find_ticket(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(settled.id).await, TicketStatus::Confirmed);
    assert_eq!(status(stuck.id).await, TicketStatus::Canceled);
    assert_eq!(status(unknown.id).await, TicketStatus::Canceled);
    assert_eq!(
        fx.gateway.cancellations(),
        vec![stuck.payment_ref.clone().unwrap()]
    );
}

#[tokio::test]
async fn test_sweeper_skips_ticket_when_void_fails() {
    let fx = Fixture::new();
    let showing = fx.showing().await;
    let user = fx.user("ana@example.com").await;

    fx.gateway.script_payment(PaymentScript::Processing);
    let pending = fx
        .book(user.id, showing.schedule.id, showing.seats[0].id)
        .await
        .unwrap()
        .ticket;
    fx.gateway.fail_cancels(true);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let sweeper = PendingSweeper::new(
        fx.store.clone(),
        fx.gateway.clone(),
        Duration::ZERO,
        Duration::from_secs(60),
    );
    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.skipped, 1);

    let ticket = fx.store.find_ticket(pending.id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
}
