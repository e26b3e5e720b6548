pub mod accounts;
pub mod availability;
pub mod booking;
pub mod catalog;
pub mod conflict;
pub mod layout;
pub mod payments;
pub mod pricing;
pub mod reconciler;
pub mod sweeper;

pub use accounts::AccountService;
pub use availability::AvailabilityChecker;
pub use booking::{BookingService, BookingSettings};
pub use catalog::CatalogService;
pub use conflict::ScheduleConflictDetector;
pub use payments::PaymentService;
pub use reconciler::{ReconcileOutcome, WebhookReconciler};
pub use sweeper::PendingSweeper;
