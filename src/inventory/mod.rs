//! Inventory routes. The collection endpoint carries all four verbs; PUT and
//! DELETE address the row through an `id` field in the JSON body.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::db;
use crate::security::Tenant;
use crate::shared::models::{InventoryChanges, InventoryItem};
use crate::shared::state::AppState;
use crate::storage;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn validate_inventory_item(data: &Value) -> Result<(), &'static str> {
    let required = ["name", "price", "quantity", "category", "slot"];
    if !required.iter().all(|k| data.get(*k).is_some()) {
        return Err("Missing required fields");
    }
    match data.get("price").and_then(Value::as_f64) {
        Some(price) if price >= 0.0 => {}
        _ => return Err("Invalid price"),
    }
    match data.get("quantity").and_then(Value::as_i64) {
        Some(quantity) if quantity >= 0 => {}
        _ => return Err("Invalid quantity"),
    }
    Ok(())
}

pub async fn list_inventory(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<Json<Vec<InventoryItem>>, (StatusCode, Json<Value>)> {
    let mut conn = state.conn.get().map_err(|e| fetch_failed(&e))?;
    let items = db::get_inventory(&mut conn, &tenant_id).map_err(|e| fetch_failed(&e))?;
    Ok(Json(items))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Json(payload): Json<Value>,
) -> ApiResult {
    if let Err(msg) = validate_inventory_item(&payload) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"success": false, "error": msg})),
        ));
    }

    let now = Utc::now();
    let item = InventoryItem {
        machine_id: tenant_id.clone(),
        id: payload
            .get("id")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| now.timestamp_millis().to_string()),
        name: text_field(&payload, "name"),
        price: payload.get("price").and_then(Value::as_f64).unwrap_or(0.0),
        quantity: payload.get("quantity").and_then(Value::as_i64).unwrap_or(0) as i32,
        category: text_field(&payload, "category"),
        slot: text_field(&payload, "slot"),
        image: payload
            .get("image")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        description: payload
            .get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        created_at: now,
        updated_at: now,
    };

    let mut conn = state.conn.get().map_err(|e| mutation_failed(&e))?;
    db::add_inventory(&mut conn, &item).map_err(|e| mutation_failed(&e))?;
    state.registry.broadcast_inventory_update();

    Ok(Json(serde_json::json!({"success": true, "item": item})))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Json(payload): Json<Value>,
) -> ApiResult {
    let Some(item_id) = payload.get("id").and_then(Value::as_str).map(String::from) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Item ID is required for update"})),
        ));
    };

    let mut conn = state.conn.get().map_err(|e| mutation_failed(&e))?;
    let Some(current) = db::get_single_product(&mut conn, &tenant_id, &item_id)
        .map_err(|e| mutation_failed(&e))?
    else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Product not found"})),
        ));
    };

    let changes: InventoryChanges =
        serde_json::from_value(payload.clone()).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid update payload"})),
            )
        })?;

    db::update_inventory(&mut conn, &tenant_id, &item_id, &changes)
        .map_err(|e| mutation_failed(&e))?;

    // A replaced image leaves its old object behind in the bucket; clean it
    // up in the background so the caller never waits on storage.
    if let (Some(new_image), Some(old_image)) = (&changes.image, &current.image) {
        if new_image != old_image {
            schedule_image_cleanup(&state, old_image.clone());
        }
    }

    let item = db::get_single_product(&mut conn, &tenant_id, &item_id)
        .map_err(|e| mutation_failed(&e))?;
    state.registry.broadcast_inventory_update();

    Ok(Json(serde_json::json!({"success": true, "item": item})))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Json(payload): Json<Value>,
) -> ApiResult {
    let Some(item_id) = payload.get("id").and_then(Value::as_str).map(String::from) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Item ID is required for delete"})),
        ));
    };

    let mut conn = state.conn.get().map_err(|e| mutation_failed(&e))?;
    let Some(current) = db::get_single_product(&mut conn, &tenant_id, &item_id)
        .map_err(|e| mutation_failed(&e))?
    else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Product not found"})),
        ));
    };

    db::delete_inventory_item(&mut conn, &tenant_id, &item_id)
        .map_err(|e| mutation_failed(&e))?;

    if let Some(old_image) = &current.image {
        schedule_image_cleanup(&state, old_image.clone());
    }

    state.registry.broadcast_inventory_update();

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Item deleted successfully"
    })))
}

#[derive(Debug, Deserialize)]
pub struct InitQuery {
    #[serde(default)]
    pub force: Option<String>,
}

pub async fn init_inventory(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<InitQuery>,
) -> ApiResult {
    let force = query.force.as_deref() == Some("true");

    let mut conn = state.conn.get().map_err(|e| init_failed(&e))?;
    let existing = db::get_inventory(&mut conn, &tenant_id).map_err(|e| init_failed(&e))?;

    if !existing.is_empty() && !force {
        return Ok(Json(serde_json::json!({
            "success": true,
            "message": "Inventory already exists",
            "inventory": existing,
        })));
    }

    let defaults = default_inventory(&tenant_id);
    for item in &defaults {
        db::add_inventory(&mut conn, item).map_err(|e| init_failed(&e))?;
    }
    state.registry.broadcast_inventory_update();

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Inventory initialized with default products",
        "inventory": defaults,
    })))
}

fn default_inventory(machine_id: &str) -> Vec<InventoryItem> {
    let now = Utc::now();
    let item = |id: &str, name: &str, price: f64, quantity: i32, category: &str, slot: &str, image: &str, description: &str| {
        InventoryItem {
            machine_id: machine_id.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            price,
            quantity,
            category: category.to_string(),
            slot: slot.to_string(),
            image: Some(image.to_string()),
            description: Some(description.to_string()),
            created_at: now,
            updated_at: now,
        }
    };

    vec![
        item("0", "Test Product", 1.0, 100, "Test", "A1", "/product_img/download.png", "A test product for 1 Rs"),
        item("1", "Classic Chips", 25.0, 15, "Snacks", "A2", "/product_img/download.png", "Crispy potato chips with a classic flavor"),
        item("18", "Water Bottle", 20.0, 40, "Water", "G1", "/product_img/download.png", "Purified drinking water"),
    ]
}

fn schedule_image_cleanup(state: &Arc<AppState>, url: String) {
    if storage::is_default_image(&state.config.drive, &url) {
        info!("Skipping deletion of default image: {}", url);
        return;
    }
    let Some(key) = storage::object_key_from_url(&state.config.drive, &url) else {
        return;
    };
    let Some(s3) = state.drive.clone() else {
        warn!("Drive not configured, leaving old image in place: {}", url);
        return;
    };
    let bucket = state.config.drive.bucket.clone();

    tokio::spawn(async move {
        match storage::delete_object(&s3, &bucket, &key).await {
            Ok(()) => info!("Deleted old image: {}", key),
            Err(e) => warn!("Failed to delete old image {}: {}", key, e),
        }
    });
}

fn text_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn fetch_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Failed to fetch inventory: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to fetch inventory"})),
    )
}

fn mutation_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Inventory mutation failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Inventory update failed"})),
    )
}

fn init_failed(e: &dyn std::fmt::Display) -> (StatusCode, Json<Value>) {
    error!("Error initializing inventory: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"success": false, "error": "Failed to initialize inventory"})),
    )
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/inventory",
            get(list_inventory)
                .post(create_item)
                .put(update_item)
                .delete(delete_item),
        )
        .route("/api/inventory/init", get(init_inventory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_complete_item() {
        let payload = serde_json::json!({
            "name": "Chips", "price": 25, "quantity": 10,
            "category": "Snacks", "slot": "A2"
        });
        assert!(validate_inventory_item(&payload).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let payload = serde_json::json!({"name": "Chips", "price": 25});
        assert_eq!(
            validate_inventory_item(&payload),
            Err("Missing required fields")
        );
    }

    #[test]
    fn rejects_negative_price() {
        let payload = serde_json::json!({
            "name": "Chips", "price": -1, "quantity": 10,
            "category": "Snacks", "slot": "A2"
        });
        assert_eq!(validate_inventory_item(&payload), Err("Invalid price"));
    }

    #[test]
    fn rejects_non_numeric_price() {
        let payload = serde_json::json!({
            "name": "Chips", "price": "25", "quantity": 10,
            "category": "Snacks", "slot": "A2"
        });
        assert_eq!(validate_inventory_item(&payload), Err("Invalid price"));
    }

    #[test]
    fn rejects_fractional_quantity() {
        let payload = serde_json::json!({
            "name": "Chips", "price": 25, "quantity": 1.5,
            "category": "Snacks", "slot": "A2"
        });
        assert_eq!(validate_inventory_item(&payload), Err("Invalid quantity"));
    }

    #[test]
    fn rejects_negative_quantity() {
        let payload = serde_json::json!({
            "name": "Chips", "price": 25, "quantity": -3,
            "category": "Snacks", "slot": "A2"
        });
        assert_eq!(validate_inventory_item(&payload), Err("Invalid quantity"));
    }

    #[test]
    fn zero_price_and_quantity_are_valid() {
        let payload = serde_json::json!({
            "name": "Freebie", "price": 0, "quantity": 0,
            "category": "Test", "slot": "A1"
        });
        assert!(validate_inventory_item(&payload).is_ok());
    }
}
