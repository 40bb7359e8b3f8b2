//! Realtime channel: one WebSocket endpoint shared by kiosk machines and
//! admin dashboards. Machines announce themselves with a `register` message;
//! the server fans change events out to every connected client.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    pub id: String,
    pub status: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "inventoryUpdated")]
    InventoryUpdated,
    #[serde(rename = "ordersUpdated")]
    OrdersUpdated,
    #[serde(rename = "paymentUpdate", rename_all = "camelCase")]
    PaymentUpdate {
        order_id: String,
        payment_id: Option<String>,
        amount: f64,
        status: String,
    },
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(default)]
    r#type: String,
    machine_id: Option<String>,
}

/// Connection registry owned by the process state and injected into handlers.
/// Entries are independent per machine id; the tracked machine additionally
/// carries an online/offline record with a heartbeat timestamp.
pub struct MachineRegistry {
    connections: RwLock<HashMap<String, Uuid>>,
    tracked: RwLock<MachineStatus>,
    events: broadcast::Sender<RealtimeEvent>,
}

impl MachineRegistry {
    pub fn new(machine_id: String) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            connections: RwLock::new(HashMap::new()),
            tracked: RwLock::new(MachineStatus {
                id: machine_id,
                status: "offline".to_string(),
                last_heartbeat: None,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events.subscribe()
    }

    pub async fn register(&self, machine_id: &str, conn_id: Uuid) {
        self.connections
            .write()
            .await
            .insert(machine_id.to_string(), conn_id);

        let mut tracked = self.tracked.write().await;
        if tracked.id == machine_id {
            tracked.status = "online".to_string();
            tracked.last_heartbeat = Some(Utc::now());
        }
        info!("[ws] Machine {} registered", machine_id);
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        let mut connections = self.connections.write().await;
        let machine = connections
            .iter()
            .find(|(_, sid)| **sid == conn_id)
            .map(|(mid, _)| mid.clone());

        if let Some(machine_id) = machine {
            connections.remove(&machine_id);
            let mut tracked = self.tracked.write().await;
            if tracked.id == machine_id {
                tracked.status = "offline".to_string();
                tracked.last_heartbeat = Some(Utc::now());
            }
            info!("[ws] Machine {} disconnected", machine_id);
        }
    }

    pub async fn tracked_status(&self) -> MachineStatus {
        self.tracked.read().await.clone()
    }

    pub async fn status_for(&self, machine_id: &str) -> Option<MachineStatus> {
        {
            let tracked = self.tracked.read().await;
            if tracked.id == machine_id {
                return Some(tracked.clone());
            }
        }
        if self.connections.read().await.contains_key(machine_id) {
            return Some(MachineStatus {
                id: machine_id.to_string(),
                status: "online".to_string(),
                last_heartbeat: None,
            });
        }
        None
    }

    pub fn broadcast_inventory_update(&self) {
        let _ = self.events.send(RealtimeEvent::InventoryUpdated);
    }

    pub fn broadcast_orders_update(&self) {
        let _ = self.events.send(RealtimeEvent::OrdersUpdated);
    }

    pub fn broadcast_payment_update(
        &self,
        order_id: &str,
        payment_id: Option<&str>,
        amount: f64,
        status: &str,
    ) {
        let _ = self.events.send(RealtimeEvent::PaymentUpdate {
            order_id: order_id.to_string(),
            payment_id: payment_id.map(|p| p.to_string()),
            amount,
            status: status.to_string(),
        });
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();
    let mut events = state.registry.subscribe();

    info!("[ws] New connection {}", conn_id);

    let registry = Arc::clone(&state.registry);
    let recv_registry = Arc::clone(&registry);

    let receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(message) = serde_json::from_str::<ClientMessage>(&text) {
                        if message.r#type == "register" {
                            if let Some(machine_id) = message.machine_id {
                                recv_registry.register(&machine_id, conn_id).await;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    error!("[ws] Connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = receive_task => {}
        _ = send_task => {}
    }

    registry.unregister(conn_id).await;
}

pub async fn machine_status(State(state): State<Arc<AppState>>) -> Json<MachineStatus> {
    Json(state.registry.tracked_status().await)
}

pub async fn machine_status_by_id(
    State(state): State<Arc<AppState>>,
    Path(machine_id): Path<String>,
) -> Result<Json<MachineStatus>, (StatusCode, Json<serde_json::Value>)> {
    match state.registry.status_for(&machine_id).await {
        Some(status) => Ok(Json(status)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Machine not found"})),
        )),
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/machine/status", get(machine_status))
        .route("/api/machine/status/:machine_id", get(machine_status_by_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_flips_tracked_machine_online() {
        let registry = MachineRegistry::new("VM-001".to_string());
        assert_eq!(registry.tracked_status().await.status, "offline");

        let conn = Uuid::new_v4();
        registry.register("VM-001", conn).await;

        let status = registry.tracked_status().await;
        assert_eq!(status.status, "online");
        assert!(status.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn disconnect_reverts_tracked_machine_to_offline() {
        let registry = MachineRegistry::new("VM-001".to_string());
        let conn = Uuid::new_v4();
        registry.register("VM-001", conn).await;
        registry.unregister(conn).await;

        let status = registry.tracked_status().await;
        assert_eq!(status.status, "offline");
    }

    #[tokio::test]
    async fn unregister_of_unknown_connection_is_a_no_op() {
        let registry = MachineRegistry::new("VM-001".to_string());
        registry.register("VM-001", Uuid::new_v4()).await;
        registry.unregister(Uuid::new_v4()).await;
        assert_eq!(registry.tracked_status().await.status, "online");
    }

    #[tokio::test]
    async fn secondary_machines_report_online_while_registered() {
        let registry = MachineRegistry::new("VM-001".to_string());
        let conn = Uuid::new_v4();
        registry.register("VM-002", conn).await;

        let status = registry.status_for("VM-002").await.expect("registered");
        assert_eq!(status.status, "online");
        // The tracked machine is unaffected by other registrations.
        assert_eq!(registry.tracked_status().await.status, "offline");

        registry.unregister(conn).await;
        assert!(registry.status_for("VM-002").await.is_none());
    }

    #[tokio::test]
    async fn broadcasts_reach_subscribers() {
        let registry = MachineRegistry::new("VM-001".to_string());
        let mut rx = registry.subscribe();
        registry.broadcast_inventory_update();

        let event = rx.recv().await.expect("event");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"type": "inventoryUpdated"})
        );
    }

    #[test]
    fn payment_event_uses_camel_case_fields() {
        let event = RealtimeEvent::PaymentUpdate {
            order_id: "BB42".to_string(),
            payment_id: Some("pay_1".to_string()),
            amount: 25.0,
            status: "paid".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "type": "paymentUpdate",
                "orderId": "BB42",
                "paymentId": "pay_1",
                "amount": 25.0,
                "status": "paid",
            })
        );
    }
}
