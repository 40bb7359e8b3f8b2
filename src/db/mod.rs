//! Thin tenant-scoped access layer over the hosted `inventory` and `orders`
//! tables. Every function takes the tenant (`machine_id`) explicitly so no
//! query can cross a machine boundary.

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;

use crate::shared::models::{InventoryChanges, InventoryItem, Order, OrderChanges};
use crate::shared::schema::{inventory, orders};

pub fn get_inventory(
    conn: &mut PgConnection,
    machine_id: &str,
) -> QueryResult<Vec<InventoryItem>> {
    inventory::table
        .filter(inventory::machine_id.eq(machine_id))
        .order(inventory::created_at.desc())
        .load(conn)
}

pub fn get_single_product(
    conn: &mut PgConnection,
    machine_id: &str,
    item_id: &str,
) -> QueryResult<Option<InventoryItem>> {
    inventory::table
        .filter(inventory::machine_id.eq(machine_id))
        .filter(inventory::id.eq(item_id))
        .first(conn)
        .optional()
}

pub fn add_inventory(conn: &mut PgConnection, item: &InventoryItem) -> QueryResult<usize> {
    diesel::insert_into(inventory::table).values(item).execute(conn)
}

pub fn update_inventory(
    conn: &mut PgConnection,
    machine_id: &str,
    item_id: &str,
    changes: &InventoryChanges,
) -> QueryResult<usize> {
    diesel::update(
        inventory::table
            .filter(inventory::machine_id.eq(machine_id))
            .filter(inventory::id.eq(item_id)),
    )
    .set((changes, inventory::updated_at.eq(Utc::now())))
    .execute(conn)
}

pub fn delete_inventory_item(
    conn: &mut PgConnection,
    machine_id: &str,
    item_id: &str,
) -> QueryResult<usize> {
    diesel::delete(
        inventory::table
            .filter(inventory::machine_id.eq(machine_id))
            .filter(inventory::id.eq(item_id)),
    )
    .execute(conn)
}

pub fn get_orders(conn: &mut PgConnection, machine_id: &str) -> QueryResult<Vec<Order>> {
    orders::table
        .filter(orders::machine_id.eq(machine_id))
        .order(orders::created_at.desc())
        .load(conn)
}

pub fn get_order(
    conn: &mut PgConnection,
    machine_id: &str,
    order_id: &str,
) -> QueryResult<Option<Order>> {
    orders::table
        .filter(orders::machine_id.eq(machine_id))
        .filter(orders::order_id.eq(order_id))
        .first(conn)
        .optional()
}

pub fn add_order(conn: &mut PgConnection, order: &Order) -> QueryResult<usize> {
    diesel::insert_into(orders::table).values(order).execute(conn)
}

pub fn update_order(
    conn: &mut PgConnection,
    machine_id: &str,
    order_id: &str,
    changes: &OrderChanges,
) -> QueryResult<usize> {
    diesel::update(
        orders::table
            .filter(orders::machine_id.eq(machine_id))
            .filter(orders::order_id.eq(order_id)),
    )
    .set((changes, orders::updated_at.eq(Utc::now())))
    .execute(conn)
}

/// Webhook-side update: the provider cannot supply a tenant header, so the
/// row is addressed by order id alone.
pub fn update_order_by_id(
    conn: &mut PgConnection,
    order_id: &str,
    changes: &OrderChanges,
) -> QueryResult<usize> {
    diesel::update(orders::table.filter(orders::order_id.eq(order_id)))
        .set((changes, orders::updated_at.eq(Utc::now())))
        .execute(conn)
}

pub fn get_payment_status(
    conn: &mut PgConnection,
    order_id: &str,
) -> QueryResult<Option<String>> {
    orders::table
        .filter(orders::order_id.eq(order_id))
        .select(orders::payment_status)
        .first(conn)
        .optional()
}
