//! Payment initiation and dual-channel reconciliation.
//!
//! An order's payment can be confirmed by the paying client (browser
//! checkout callback) and by the gateway (server-to-server webhook). Both
//! report the same capture, in any order, any number of times. `reconcile`
//! is the single place allowed to move `payment_status`, and it converges
//! the ledger row to one final state no matter how the reports interleave.

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateIntentRequest, IntentNotes, PaymentGateway},
    models::{PaymentMethod, PaymentStatus},
    services::orders::{self, NewOrder, NewOrderLine, OrderService},
    services::signature::SignatureVerifier,
};

/// Which channel reported the payment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChannel {
    ClientVerify,
    Webhook,
}

/// What the channel asserts happened. The client-verify payload has no
/// failure path, so only webhooks ever assert `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredOutcome {
    Captured,
    Failed,
}

/// A normalized, unauthenticated report of a payment outcome. Transient;
/// built by an intake adapter and consumed by `reconcile`.
#[derive(Debug, Clone)]
pub struct VerificationAttempt {
    pub order_id: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub provided_signature: String,
    /// The exact bytes the signature covers: `"{gateway_order_id}|{gateway_payment_id}"`
    /// for the client channel, the raw delivery body for the webhook channel.
    pub signed_payload: Bytes,
    pub channel: SourceChannel,
    pub outcome: DeclaredOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationResult {
    pub order_id: String,
    pub payment_status: PaymentStatus,
    /// Whether this attempt changed the ledger row. Duplicate deliveries
    /// report success with `changed = false`.
    pub changed: bool,
}

/// What the caller needs to hand the client so it can complete checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentInitiation {
    pub order_id: String,
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: Option<String>,
}

/// Input to `initiate_payment`.
#[derive(Debug, Clone)]
pub struct InitiatePaymentRequest {
    pub store_id: String,
    pub customer: Option<String>,
    pub items: Vec<NewOrderLine>,
    pub declared_total: Option<Decimal>,
}

/// Outcome of one webhook delivery after authentication.
#[derive(Debug)]
pub enum WebhookDisposition {
    Processed(ReconciliationResult),
    /// Authenticated but not a capture/failure we act on.
    Ignored(&'static str),
    /// Authenticated and well-formed, but not resolvable to a ledger row.
    /// Acknowledged to the gateway so it stops redelivering.
    Unmatched(String),
}

/// Per-order mutual exclusion for the read-verify-write sequence. Locks are
/// keyed by local order id; no cross-order locking exists.
#[derive(Default)]
struct OrderLockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OrderLockRegistry {
    async fn acquire(&self, order_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let entry = self.locks.entry(order_id.to_string()).or_default();
            Arc::clone(entry.value())
        };
        mutex.lock_owned().await
    }
}

#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<OrderService>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    gateway_key_id: Option<String>,
    client_verifier: SignatureVerifier,
    webhook_verifier: SignatureVerifier,
    currency: String,
    ledger_timeout: Duration,
    order_locks: Arc<OrderLockRegistry>,
    event_sender: Option<EventSender>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<OrderService>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        config: &AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            orders,
            gateway,
            gateway_key_id: config.gateway_key_id.clone(),
            client_verifier: SignatureVerifier::new(config.gateway_key_secret.clone()),
            webhook_verifier: SignatureVerifier::new(config.gateway_webhook_secret.clone()),
            currency: config.currency.clone(),
            ledger_timeout: Duration::from_secs(config.ledger_timeout_secs),
            order_locks: Arc::new(OrderLockRegistry::default()),
            event_sender,
        }
    }

    pub fn webhook_configured(&self) -> bool {
        self.webhook_verifier.is_configured()
    }

    /// Creates a local order in the pending state and opens a gateway intent
    /// for its computed total.
    ///
    /// If the gateway call fails, the local order is deliberately left in
    /// place (not rolled back) so a client retry can reuse it; an orphaned
    /// pending row is preferable to losing the order.
    #[instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentInitiation, ServiceError> {
        let gateway = self.gateway.clone().ok_or_else(|| {
            ServiceError::ConfigurationError("payment gateway keys are not configured".to_string())
        })?;

        let items = orders::sanitize_items(request.items)?;
        let total = orders::compute_total(&items);
        if total <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "order total must be positive".to_string(),
            ));
        }
        let amount_minor = to_minor_units(total)?;

        let order = self
            .orders
            .create_order(NewOrder {
                store_id: request.store_id.clone(),
                customer: request.customer,
                items,
                declared_total: request.declared_total,
                payment_method: Some(PaymentMethod::Card),
            })
            .await?;

        // The gateway call happens outside any per-order lock; it can block
        // on network I/O and must not stall reconciliation.
        let intent = match gateway
            .create_intent(CreateIntentRequest {
                amount: amount_minor,
                currency: self.currency.clone(),
                receipt: order.id.clone(),
                notes: IntentNotes {
                    store_id: request.store_id,
                },
            })
            .await
        {
            Ok(intent) => intent,
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    "Gateway intent creation failed; pending order retained for retry"
                );
                return Err(err);
            }
        };

        self.orders.link_gateway_order(&order.id, &intent.id).await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::PaymentInitiated {
                    order_id: order.id.clone(),
                    gateway_order_id: intent.id.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order.id, "Failed to send payment initiated event");
            }
        }

        Ok(PaymentInitiation {
            order_id: order.id,
            gateway_order_id: intent.id,
            amount_minor: intent.amount,
            currency: intent.currency,
            key_id: self.gateway_key_id.clone(),
        })
    }

    /// Builds and reconciles a capture attempt from the client channel.
    pub async fn verify_client_payment(
        &self,
        order_id: &str,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<ReconciliationResult, ServiceError> {
        let signed_payload = Bytes::from(format!("{}|{}", gateway_order_id, gateway_payment_id));
        self.reconcile(VerificationAttempt {
            order_id: order_id.to_string(),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: gateway_payment_id.to_string(),
            provided_signature: signature.to_string(),
            signed_payload,
            channel: SourceChannel::ClientVerify,
            outcome: DeclaredOutcome::Captured,
        })
        .await
    }

    /// Authenticates and applies one webhook delivery.
    ///
    /// The transport signature covers the entire raw body and is checked
    /// before the JSON is parsed. Once a delivery is authenticated and
    /// structurally valid, unresolvable orders are acknowledged (not
    /// errored) so the gateway does not retry-storm a permanent mismatch.
    #[instrument(skip(self, body, signature))]
    pub async fn process_webhook(
        &self,
        body: Bytes,
        signature: &str,
    ) -> Result<WebhookDisposition, ServiceError> {
        if !self.webhook_verifier.is_configured() {
            return Err(ServiceError::ConfigurationError(
                "webhook secret is not configured".to_string(),
            ));
        }

        self.webhook_verifier.verify(&body, signature).map_err(|err| {
            if matches!(err, ServiceError::InvalidSignature) {
                warn!("Webhook delivery failed signature verification");
            }
            err
        })?;

        let envelope: WebhookEnvelope = serde_json::from_slice(&body)
            .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))?;

        let Some(payload) = envelope.payload else {
            return Ok(WebhookDisposition::Ignored("delivery carries no payload"));
        };
        let Some(payment) = payload.payment.map(|w| w.entity) else {
            return Ok(WebhookDisposition::Ignored("delivery carries no payment entity"));
        };

        let outcome = match payment.status.as_str() {
            "captured" => DeclaredOutcome::Captured,
            "failed" => DeclaredOutcome::Failed,
            other => {
                info!(event = ?envelope.event, payment_status = %other, "Unhandled webhook payment status");
                return Ok(WebhookDisposition::Ignored("unhandled payment status"));
            }
        };

        let order_ref = payload.order.map(|w| w.entity);
        // The intent's receipt was set to our order id at creation time.
        let Some(order_id) = order_ref.as_ref().and_then(|o| o.receipt.clone()) else {
            warn!(event = ?envelope.event, "Webhook delivery carries no receipt; acknowledging");
            return Ok(WebhookDisposition::Unmatched(
                "delivery carries no receipt".to_string(),
            ));
        };

        let gateway_order_id = payment
            .order_id
            .clone()
            .or_else(|| order_ref.and_then(|o| o.id))
            .unwrap_or_default();

        let attempt = VerificationAttempt {
            order_id,
            gateway_order_id,
            gateway_payment_id: payment.id,
            provided_signature: signature.to_string(),
            signed_payload: body,
            channel: SourceChannel::Webhook,
            outcome,
        };

        match self.reconcile(attempt).await {
            Ok(result) => Ok(WebhookDisposition::Processed(result)),
            Err(ServiceError::NotFound(msg)) => {
                warn!(%msg, "Webhook references unknown order; acknowledging to stop retries");
                Ok(WebhookDisposition::Unmatched(msg))
            }
            Err(ServiceError::GatewayOrderMismatch) => {
                warn!("Webhook gateway order id disagrees with ledger; acknowledging");
                Ok(WebhookDisposition::Unmatched(
                    "gateway order mismatch".to_string(),
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Applies one verification attempt to the ledger.
    ///
    /// The read-verify-write sequence is serialized per order id, so two
    /// concurrent attempts for the same order cannot both observe `pending`
    /// and race their transitions. Ledger operations run under a bounded
    /// timeout; exhausting it fails the attempt as retryable instead of
    /// leaving a partial write behind.
    #[instrument(skip(self, attempt), fields(order_id = %attempt.order_id, channel = ?attempt.channel, outcome = ?attempt.outcome))]
    pub async fn reconcile(
        &self,
        attempt: VerificationAttempt,
    ) -> Result<ReconciliationResult, ServiceError> {
        let _guard = self.order_locks.acquire(&attempt.order_id).await;

        let order = self
            .with_ledger_timeout(self.orders.find_model(&attempt.order_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", attempt.order_id)))?;

        // A signature can be individually valid yet belong to a different
        // order; the stored intent id is the authority.
        if let Some(stored) = order.gateway_order_id.as_deref() {
            if stored != attempt.gateway_order_id {
                warn!(
                    stored_gateway_order_id = %stored,
                    attempt_gateway_order_id = %attempt.gateway_order_id,
                    "Rejecting verification attempt for mismatched gateway order"
                );
                return Err(ServiceError::GatewayOrderMismatch);
            }
        }

        let verifier = match attempt.channel {
            SourceChannel::ClientVerify => &self.client_verifier,
            SourceChannel::Webhook => &self.webhook_verifier,
        };
        if let Err(err) = verifier.verify(&attempt.signed_payload, &attempt.provided_signature) {
            if matches!(err, ServiceError::InvalidSignature) {
                warn!("Rejecting verification attempt with invalid signature");
                counter!("canteen_payments.invalid_signature_total", 1);
            }
            return Err(err);
        }

        let current = PaymentStatus::from_column(&order.payment_status);
        if current == PaymentStatus::Paid {
            // Duplicate webhook delivery or a client verify arriving after
            // the webhook settled it. Nothing is written, including the
            // stored signature.
            info!("Order already paid; acknowledging duplicate attempt");
            counter!("canteen_payments.duplicate_attempt_total", 1);
            return Ok(ReconciliationResult {
                order_id: attempt.order_id,
                payment_status: PaymentStatus::Paid,
                changed: false,
            });
        }

        match attempt.outcome {
            DeclaredOutcome::Captured => {
                let changed = self
                    .with_ledger_timeout(self.orders.record_capture(
                        &attempt.order_id,
                        &attempt.gateway_payment_id,
                        &attempt.provided_signature,
                    ))
                    .await?;

                if changed {
                    info!(gateway_payment_id = %attempt.gateway_payment_id, "Payment captured");
                    counter!("canteen_payments.captured_total", 1);
                    self.emit(Event::PaymentCaptured {
                        order_id: attempt.order_id.clone(),
                        gateway_payment_id: attempt.gateway_payment_id.clone(),
                    })
                    .await;
                }

                Ok(ReconciliationResult {
                    order_id: attempt.order_id,
                    payment_status: PaymentStatus::Paid,
                    changed,
                })
            }
            DeclaredOutcome::Failed => {
                let changed = self
                    .with_ledger_timeout(self.orders.record_failure(&attempt.order_id))
                    .await?;

                if changed {
                    info!("Payment marked failed");
                    self.emit(Event::PaymentFailed {
                        order_id: attempt.order_id.clone(),
                    })
                    .await;
                }

                Ok(ReconciliationResult {
                    order_id: attempt.order_id,
                    payment_status: if changed { PaymentStatus::Failed } else { current },
                    changed,
                })
            }
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send payment event");
            }
        }
    }

    async fn with_ledger_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::time::timeout(self.ledger_timeout, fut)
            .await
            .map_err(|_| {
                ServiceError::ServiceUnavailable("ledger operation timed out".to_string())
            })?
    }
}

/// Converts a major-unit total to the gateway's minor-unit integer
/// representation, rounding half away from zero.
pub fn to_minor_units(total: Decimal) -> Result<i64, ServiceError> {
    let minor = (total * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    minor.to_i64().ok_or_else(|| {
        ServiceError::ValidationError("order total exceeds representable amount".to_string())
    })
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<EntityWrapper<PaymentEntity>>,
    #[serde(default)]
    order: Option<EntityWrapper<OrderEntityRef>>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    status: String,
    #[serde(default)]
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntityRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    receipt: Option<String>,
}
