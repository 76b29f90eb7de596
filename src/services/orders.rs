use crate::{
    db::DbPool,
    entities::order::{self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel},
    entities::order_item::{self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{FulfillmentStatus, PaymentMethod, PaymentStatus},
};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

/// Upper bound on stored line-item names; longer names are truncated, not rejected.
const MAX_ITEM_NAME_LEN: usize = 160;
const MAX_CUSTOMER_LEN: usize = 160;

/// A new order before persistence.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub store_id: String,
    pub customer: Option<String>,
    pub items: Vec<NewOrderLine>,
    pub declared_total: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderLineResponse {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: String,
    pub store_id: String,
    pub customer: String,
    pub status: FulfillmentStatus,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub total: Decimal,
    pub declared_total: Option<Decimal>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderLineResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service owning the order ledger: every read and write of order rows and
/// their line items goes through here.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order and its line items in one transaction.
    ///
    /// The stored total is always recomputed from the sanitized line items;
    /// a client-declared total is kept only for display and audit.
    #[instrument(skip(self, new_order), fields(store_id = %new_order.store_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderResponse, ServiceError> {
        let store_id = new_order.store_id.trim().to_string();
        if store_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "store_id is required".to_string(),
            ));
        }

        let items = sanitize_items(new_order.items)?;
        let total = compute_total(&items);

        if let Some(declared) = new_order.declared_total {
            if declared != total {
                warn!(%declared, %total, "Client-declared total differs from computed total; using computed");
            }
        }

        let customer = normalize_customer(new_order.customer);
        let order_id = generate_order_id();
        let now = Utc::now();

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = OrderActiveModel {
            id: Set(order_id.clone()),
            store_id: Set(store_id.clone()),
            customer: Set(customer.clone()),
            status: Set(FulfillmentStatus::Pending.to_string()),
            payment_method: Set(new_order.payment_method.map(|m| m.to_string())),
            payment_status: Set(PaymentStatus::Pending.to_string()),
            total: Set(total),
            declared_total: Set(new_order.declared_total),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;

        let item_models: Vec<OrderItemActiveModel> = items
            .iter()
            .map(|line| OrderItemActiveModel {
                order_id: Set(order_id.clone()),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                ..Default::default()
            })
            .collect();

        OrderItemEntity::insert_many(item_models)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order items");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, %total, "Order created");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderCreated {
                    order_id: order_id.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send order created event");
            }
        }

        let item_responses = items
            .into_iter()
            .map(|line| OrderLineResponse {
                name: line.name,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        Ok(model_to_response(order_model, item_responses))
    }

    /// Fetches one order with its line items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order_model) = OrderEntity::find_by_id(order_id).one(db).await? else {
            return Ok(None);
        };

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await?;

        Ok(Some(model_to_response(
            order_model,
            items.into_iter().map(item_to_response).collect(),
        )))
    }

    /// Lists orders, newest first, optionally restricted to one store.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        store_id: Option<String>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(store) = store_id.as_deref().filter(|s| !s.is_empty()) {
            query = query.filter(order::Column::StoreId.eq(store));
        }

        let paginator = query.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
        let mut items_by_order: HashMap<String, Vec<OrderLineResponse>> = HashMap::new();
        if !order_ids.is_empty() {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .order_by_asc(order_item::Column::Id)
                .all(db)
                .await?;
            for item in items {
                items_by_order
                    .entry(item.order_id.clone())
                    .or_default()
                    .push(item_to_response(item));
            }
        }

        let orders = orders
            .into_iter()
            .map(|model| {
                let items = items_by_order.remove(&model.id).unwrap_or_default();
                model_to_response(model, items)
            })
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Moves an order through the fulfillment lifecycle. Never touches
    /// payment fields.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %status))]
    pub async fn update_fulfillment_status(
        &self,
        order_id: &str,
        status: FulfillmentStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let order_model = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                warn!(order_id = %order_id, "Order not found for status update");
                ServiceError::NotFound(format!("order {} not found", order_id))
            })?;

        let old_status = order_model.status.clone();

        let mut active_model: OrderActiveModel = order_model.into();
        active_model.status = Set(status.to_string());
        active_model.updated_at = Set(Some(Utc::now()));

        let updated = active_model.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update fulfillment status");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, %old_status, new_status = %status, "Order status updated");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::OrderStatusChanged {
                    order_id: order_id.to_string(),
                    old_status,
                    new_status: status.to_string(),
                })
                .await
            {
                warn!(error = %e, order_id = %order_id, "Failed to send status changed event");
            }
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(db)
            .await?;

        Ok(model_to_response(
            updated,
            items.into_iter().map(item_to_response).collect(),
        ))
    }

    // ---- Ledger operations used by the reconciliation engine ----

    /// Raw ledger row fetch, used by the reconciliation engine which needs
    /// the stored gateway columns rather than the response shape.
    pub async fn find_model(&self, order_id: &str) -> Result<Option<OrderModel>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Links the gateway intent to the order. The column is written at most
    /// once; a second link attempt fails rather than overwriting.
    pub async fn link_gateway_order(
        &self,
        order_id: &str,
        gateway_order_id: &str,
    ) -> Result<(), ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::GatewayOrderId,
                Expr::value(Some(gateway_order_id.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::GatewayOrderId.is_null())
            .exec(&*self.db_pool)
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id = %order_id, "Gateway order id already linked; refusing to overwrite");
            return Err(ServiceError::GatewayOrderMismatch);
        }
        Ok(())
    }

    /// Marks an order paid and records the capture audit fields in a single
    /// conditional update. Returns `false` when the row was already paid, in
    /// which case nothing was written.
    pub async fn record_capture(
        &self,
        order_id: &str,
        gateway_payment_id: &str,
        gateway_signature: &str,
    ) -> Result<bool, ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid.to_string()),
            )
            .col_expr(
                order::Column::GatewayPaymentId,
                Expr::value(Some(gateway_payment_id.to_string())),
            )
            .col_expr(
                order::Column::GatewaySignature,
                Expr::value(Some(gateway_signature.to_string())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.ne(PaymentStatus::Paid.to_string()))
            .exec(&*self.db_pool)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Marks an order failed, but only from the pending state; a paid or
    /// already-failed row is left untouched. Returns whether a row changed.
    pub async fn record_failure(&self, order_id: &str) -> Result<bool, ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed.to_string()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending.to_string()))
            .exec(&*self.db_pool)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

fn normalize_customer(customer: Option<String>) -> String {
    let trimmed = customer.map(|c| c.trim().to_string()).unwrap_or_default();
    if trimmed.is_empty() {
        "Guest".to_string()
    } else {
        truncate(&trimmed, MAX_CUSTOMER_LEN)
    }
}

pub(crate) fn sanitize_items(items: Vec<NewOrderLine>) -> Result<Vec<NewOrderLine>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one line item is required".to_string(),
        ));
    }

    items
        .into_iter()
        .map(|line| {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "line item quantity must be at least 1".to_string(),
                ));
            }
            if line.unit_price.is_sign_negative() {
                return Err(ServiceError::ValidationError(
                    "line item price must not be negative".to_string(),
                ));
            }
            let name = truncate(line.name.trim(), MAX_ITEM_NAME_LEN);
            Ok(NewOrderLine {
                name: if name.is_empty() {
                    "Item".to_string()
                } else {
                    name
                },
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
        })
        .collect()
}

pub(crate) fn compute_total(items: &[NewOrderLine]) -> Decimal {
    items
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum()
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Opaque order identifier, e.g. `ORD-4F7Q2A`.
fn generate_order_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("ORD-{}", suffix.to_uppercase())
}

fn item_to_response(item: OrderItemModel) -> OrderLineResponse {
    OrderLineResponse {
        name: item.name,
        quantity: item.quantity,
        unit_price: item.unit_price,
    }
}

fn model_to_response(model: OrderModel, items: Vec<OrderLineResponse>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        store_id: model.store_id,
        customer: model.customer,
        status: FulfillmentStatus::from_column(&model.status),
        payment_method: model.payment_method,
        payment_status: PaymentStatus::from_column(&model.payment_status),
        total: model.total,
        declared_total: model.declared_total,
        gateway_order_id: model.gateway_order_id,
        gateway_payment_id: model.gateway_payment_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
        items,
    }
}
