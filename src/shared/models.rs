use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::shared::schema::{inventory, orders};

/// One vending-machine product row. Rows are partitioned by `machine_id`;
/// the composite key keeps every query tenant-scoped.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = inventory)]
pub struct InventoryItem {
    pub machine_id: String,
    pub id: String,
    pub name: String,
    pub price: f64,
    pub quantity: i32,
    pub category: String,
    pub slot: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for an inventory row; absent fields are left untouched.
#[derive(Debug, Default, Clone, Deserialize, AsChangeset)]
#[diesel(table_name = inventory)]
pub struct InventoryChanges {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i32>,
    pub category: Option<String>,
    pub slot: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = orders)]
pub struct Order {
    pub order_id: String,
    pub machine_id: String,
    pub items: serde_json::Value,
    pub total_amount: f64,
    pub payment_status: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_id: Option<String>,
    pub payment_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Deserialize, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderChanges {
    #[serde(alias = "paymentStatus")]
    pub payment_status: Option<String>,
    #[serde(alias = "customerName")]
    pub customer_name: Option<String>,
    #[serde(alias = "customerPhone")]
    pub customer_phone: Option<String>,
    pub payment_id: Option<String>,
    pub payment_amount: Option<f64>,
}
