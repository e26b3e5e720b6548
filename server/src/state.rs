use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::gateway::PaymentGateway;
use crate::services::{
    AccountService, BookingService, BookingSettings, CatalogService, PaymentService,
    WebhookReconciler,
};
use crate::store::Store;

/// Shared handler state. Every service holds the same store and gateway.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tokens: Arc<TokenIssuer>,
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub booking: BookingService,
    pub payments: PaymentService,
    pub reconciler: WebhookReconciler,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        tokens: TokenIssuer,
        settings: BookingSettings,
    ) -> Self {
        let tokens = Arc::new(tokens);
        Self {
            accounts: AccountService::new(store.clone(), tokens.clone()),
            catalog: CatalogService::new(store.clone()),
            booking: BookingService::new(store.clone(), gateway.clone(), settings),
            payments: PaymentService::new(store.clone(), gateway.clone()),
            reconciler: WebhookReconciler::new(store.clone(), gateway.clone()),
            store,
            gateway,
            tokens,
        }
    }
}
