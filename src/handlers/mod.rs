pub mod health;
pub mod orders;
pub mod payments;
pub mod webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::gateway::{HttpPaymentGateway, PaymentGateway};
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    /// Builds the service container, constructing the HTTP gateway client
    /// from the configured key pair when one is present.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let gateway: Option<Arc<dyn PaymentGateway>> =
            match (&config.gateway_key_id, &config.gateway_key_secret) {
                (Some(key_id), Some(key_secret)) => Some(Arc::new(HttpPaymentGateway::new(
                    config.gateway_base_url.clone(),
                    key_id.clone(),
                    key_secret.clone(),
                )?)),
                _ => None,
            };

        Ok(Self::with_gateway(db_pool, event_sender, config, gateway))
    }

    /// Same as [`AppServices::new`] but with an explicit gateway, letting
    /// tests substitute a fake.
    pub fn with_gateway(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        config: &AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db_pool, Some(event_sender.clone())));
        let payments = Arc::new(PaymentService::new(
            orders.clone(),
            gateway,
            config,
            Some(event_sender),
        ));

        Self { orders, payments }
    }
}
