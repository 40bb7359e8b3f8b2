//! Order routes. Creation is a deliberate two-step: the row is inserted as
//! `pending` first, then the payment provider is asked for an order and a
//! single-use QR code. A provider failure leaves the pending row behind and
//! reports the error; a fabricated QR code is never returned.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info};
use serde_json::Value;

use crate::db;
use crate::payments::razorpay::{self, QrNotes};
use crate::security::Tenant;
use crate::shared::models::{Order, OrderChanges};
use crate::shared::state::AppState;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn validate_order_payload(data: &Value) -> Result<(), &'static str> {
    if data.get("items").is_none() || data.get("totalAmount").is_none() {
        return Err("Missing required fields");
    }
    match data.get("totalAmount").and_then(Value::as_f64) {
        Some(total) if total >= 0.0 => {}
        _ => return Err("Invalid total amount"),
    }
    match data.get("items").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {}
        _ => return Err("Invalid items"),
    }
    Ok(())
}

pub fn new_order_id() -> String {
    format!("BB{}", Utc::now().timestamp_millis())
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> ApiResult {
    let mut conn = state.conn.get().map_err(|e| fetch_failed(&e))?;
    let orders = db::get_orders(&mut conn, &tenant_id).map_err(|e| fetch_failed(&e))?;
    Ok(Json(serde_json::json!({"success": true, "orders": orders})))
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Json(payload): Json<Value>,
) -> ApiResult {
    if let Err(msg) = validate_order_payload(&payload) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"success": false, "error": msg})),
        ));
    }

    let order_id = new_order_id();
    let total_amount = payload
        .get("totalAmount")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let customer_name = text_field(&payload, "customerName");
    let customer_phone = text_field(&payload, "customerPhone");
    let now = Utc::now();

    let order = Order {
        order_id: order_id.clone(),
        machine_id: tenant_id.clone(),
        items: payload.get("items").cloned().unwrap_or(Value::Array(vec![])),
        total_amount,
        payment_status: "pending".to_string(),
        customer_name: customer_name.clone(),
        customer_phone: customer_phone.clone(),
        payment_id: None,
        payment_amount: None,
        created_at: now,
        updated_at: now,
    };

    {
        let mut conn = state.conn.get().map_err(|e| creation_failed(&e))?;
        db::add_order(&mut conn, &order).map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": "Failed to create order in database"
                })),
            )
        })?;
    }
    info!("Order created in DB: {}", order_id);

    let Some(client) = &state.razorpay else {
        error!("Razorpay credentials missing, cannot generate QR code");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": "Razorpay credentials not configured. Cannot generate QR code.",
                "orderId": order_id,
            })),
        ));
    };

    let amount_paise = (total_amount * 100.0).round() as i64;

    let provider_order = match client.create_order(amount_paise, &order_id).await {
        Ok(provider_order) => provider_order,
        Err(e) => {
            error!("Razorpay order creation failed: {}", e);
            return Err(qr_generation_failed(&order_id));
        }
    };
    info!("Razorpay order created: {}", provider_order.id);

    let notes = QrNotes {
        order_id: order_id.clone(),
        machine_id: tenant_id.clone(),
        customer_name: if customer_name.is_empty() {
            "Unknown".to_string()
        } else {
            customer_name
        },
        customer_phone: if customer_phone.is_empty() {
            "Unknown".to_string()
        } else {
            customer_phone
        },
    };

    let qr_code = match client
        .create_qr_code(
            amount_paise,
            &format!("BlackBox Order {}", order_id),
            &format!("Payment for BlackBox order {}", order_id),
            &notes,
        )
        .await
    {
        Ok(qr_code) => qr_code,
        Err(e) => {
            error!("Razorpay QR creation failed: {}", e);
            return Err(qr_generation_failed(&order_id));
        }
    };

    if !razorpay::is_provider_qr_url(&qr_code.image_url) {
        error!("Invalid QR code URL: {}", qr_code.image_url);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": "Invalid QR code generated. Only Razorpay QR codes are allowed.",
                "orderId": order_id,
            })),
        ));
    }
    info!("QR code created: {} -> {}", qr_code.id, qr_code.image_url);

    state.registry.broadcast_orders_update();

    Ok(Json(serde_json::json!({
        "success": true,
        "orderId": order_id,
        "qrCodeUrl": qr_code.image_url,
        "qrCodeId": qr_code.id,
        "razorpayOrderId": provider_order.id,
        "message": "Real Razorpay QR code generated successfully!",
    })))
}

pub async fn get_order_route(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(order_id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn.get().map_err(|e| server_error(&e))?;
    match db::get_order(&mut conn, &tenant_id, &order_id).map_err(|e| server_error(&e))? {
        Some(order) => Ok(Json(serde_json::json!({"success": true, "order": order}))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": "Order not found"})),
        )),
    }
}

pub async fn update_order_route(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(order_id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult {
    let changes: OrderChanges = serde_json::from_value(payload).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"success": false, "error": "Invalid update payload"})),
        )
    })?;

    let mut conn = state.conn.get().map_err(|e| update_failed(&e))?;
    let updated = db::update_order(&mut conn, &tenant_id, &order_id, &changes)
        .map_err(|e| update_failed(&e))?;
    if updated == 0 {
        return Err(order_not_found());
    }

    state.registry.broadcast_orders_update();
    Ok(Json(serde_json::json!({"success": true, "message": "Order updated"})))
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(order_id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult {
    let Some(status) = payload.get("status").and_then(Value::as_str) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"success": false, "error": "Status is required"})),
        ));
    };

    let changes = OrderChanges {
        payment_status: Some(status.to_string()),
        ..Default::default()
    };

    let mut conn = state.conn.get().map_err(|e| update_failed(&e))?;
    let updated = db::update_order(&mut conn, &tenant_id, &order_id, &changes)
        .map_err(|e| update_failed(&e))?;
    if updated == 0 {
        return Err(order_not_found());
    }

    state.registry.broadcast_orders_update();
    Ok(Json(serde_json::json!({"success": true})))
}

/// Cancel is a status transition, never a row removal, and applies from any
/// prior status.
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(order_id): Path<String>,
) -> ApiResult {
    let changes = OrderChanges {
        payment_status: Some("cancelled".to_string()),
        ..Default::default()
    };

    let mut conn = state.conn.get().map_err(|e| cancel_failed(&e))?;
    let updated = db::update_order(&mut conn, &tenant_id, &order_id, &changes)
        .map_err(|e| cancel_failed(&e))?;
    if updated == 0 {
        return Err(order_not_found());
    }

    state.registry.broadcast_orders_update();
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Order cancelled successfully"
    })))
}

pub async fn init_orders(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> ApiResult {
    let mut conn = state.conn.get().map_err(|e| server_error(&e))?;
    let existing = db::get_orders(&mut conn, &tenant_id).map_err(|e| server_error(&e))?;

    if !existing.is_empty() {
        return Ok(Json(serde_json::json!({
            "success": true,
            "message": "Orders already exist",
            "count": existing.len(),
        })));
    }

    let samples = [
        (
            serde_json::json!([{"id": "1", "name": "Classic Chips", "price": 25, "quantity": 2}]),
            50.0,
        ),
        (
            serde_json::json!([{"id": "18", "name": "Water Bottle", "price": 20, "quantity": 1}]),
            20.0,
        ),
    ];

    let mut created = Vec::new();
    for (items, total) in samples {
        let now = Utc::now();
        let order = Order {
            order_id: format!("BB{}", now.timestamp_millis() + created.len() as i64),
            machine_id: tenant_id.clone(),
            items,
            total_amount: total,
            payment_status: "paid".to_string(),
            customer_name: String::new(),
            customer_phone: String::new(),
            payment_id: None,
            payment_amount: None,
            created_at: now,
            updated_at: now,
        };
        db::add_order(&mut conn, &order).map_err(|e| server_error(&e))?;
        created.push(order);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Created {} sample orders", created.len()),
        "orders": created,
    })))
}

/// Aggregated dashboard counters so the admin UI needs a single round-trip.
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> ApiResult {
    let mut conn = state.conn.get().map_err(|e| stats_failed(&e))?;
    let orders = db::get_orders(&mut conn, &tenant_id).map_err(|e| stats_failed(&e))?;
    let inventory = db::get_inventory(&mut conn, &tenant_id).map_err(|e| stats_failed(&e))?;

    let paid_total: f64 = orders
        .iter()
        .filter(|o| o.payment_status == "paid")
        .map(|o| o.total_amount)
        .sum();

    // Orders arrive newest-first, so the head of the list is "today's" slice.
    let today = &orders[..orders.len().min(10)];
    let paid_today: f64 = today
        .iter()
        .filter(|o| o.payment_status == "paid")
        .map(|o| o.total_amount)
        .sum();

    let low_stock = inventory.iter().filter(|i| i.quantity <= 5).count();
    let critical_stock = inventory.iter().filter(|i| i.quantity <= 2).count();
    let out_of_stock = inventory.iter().filter(|i| i.quantity == 0).count();
    let recent: Vec<&Order> = orders.iter().take(4).collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "stats": {
            "orders": {
                "total": orders.len(),
                "today": today.len(),
                "total_sales": paid_total,
                "sales_today": paid_today,
            },
            "inventory": {
                "total_items": inventory.len(),
                "low_stock": low_stock,
                "critical_stock": critical_stock,
                "out_of_stock": out_of_stock,
            },
            "recent_orders": recent,
        }
    })))
}

fn text_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn qr_generation_failed(order_id: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": "Razorpay QR code generation failed. Please try again.",
            "orderId": order_id,
            "message": "Order created but QR code generation failed",
        })),
    )
}

fn server_error(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Order route error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Server error"})),
    )
}

fn order_not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"success": false, "error": "Order not found"})),
    )
}

fn fetch_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Error fetching orders: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to fetch orders"})),
    )
}

fn creation_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Order creation error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to create order in database"})),
    )
}

fn update_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Order update error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to update order"})),
    )
}

fn cancel_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Order cancel error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to cancel order"})),
    )
}

fn stats_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Dashboard stats error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to fetch dashboard stats"})),
    )
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/init", get(init_orders))
        .route("/api/orders/:order_id", get(get_order_route).put(update_order_route))
        .route("/api/orders/:order_id/status", put(update_order_status))
        .route("/api/orders/:order_id/cancel", post(cancel_order))
        .route("/api/dashboard/stats", get(dashboard_stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_carry_the_bb_prefix_and_epoch_millis() {
        let id = new_order_id();
        assert!(id.starts_with("BB"));
        let digits = &id[2..];
        assert!(digits.len() >= 13);
        assert!(digits.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn accepts_a_valid_order() {
        let payload = serde_json::json!({
            "items": [{"id": "1", "name": "Chips", "price": 25, "quantity": 2}],
            "totalAmount": 50
        });
        assert!(validate_order_payload(&payload).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        assert_eq!(
            validate_order_payload(&serde_json::json!({"items": []})),
            Err("Missing required fields")
        );
    }

    #[test]
    fn rejects_empty_items() {
        let payload = serde_json::json!({"items": [], "totalAmount": 50});
        assert_eq!(validate_order_payload(&payload), Err("Invalid items"));
    }

    #[test]
    fn rejects_non_list_items() {
        let payload = serde_json::json!({"items": "nope", "totalAmount": 50});
        assert_eq!(validate_order_payload(&payload), Err("Invalid items"));
    }

    #[test]
    fn rejects_negative_total() {
        let payload = serde_json::json!({
            "items": [{"id": "1"}],
            "totalAmount": -10
        });
        assert_eq!(validate_order_payload(&payload), Err("Invalid total amount"));
    }

    #[test]
    fn zero_total_is_accepted() {
        let payload = serde_json::json!({
            "items": [{"id": "1"}],
            "totalAmount": 0
        });
        assert!(validate_order_payload(&payload).is_ok());
    }
}
