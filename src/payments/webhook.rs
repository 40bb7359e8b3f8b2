//! Provider webhook ingestion. The endpoint sits outside the tenant
//! middleware (the provider cannot send an `x-tenant-id` header) and always
//! acknowledges with 200 so the provider never enters a retry storm.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use log::{error, info, warn};
use serde::Deserialize;

use crate::db;
use crate::shared::models::OrderChanges;
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub qr_code: Option<Wrapped<QrCodeEntity>>,
    pub payment: Option<Wrapped<PaymentEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct Wrapped<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct QrCodeEntity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub notes: Notes,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: Option<String>,
    pub amount: Option<i64>,
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Notes,
}

#[derive(Debug, Default, Deserialize)]
pub struct Notes {
    #[serde(alias = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    MarkPaid {
        order_id: String,
        payment_id: Option<String>,
        amount: f64,
    },
    MarkFailed {
        order_id: String,
        payment_id: Option<String>,
    },
    Acknowledge(String),
}

/// Maps a provider event onto the local payment-status transition.
/// `qr_code.credited` is the primary paid signal; `payment.captured` covers
/// the same transition when the QR event is missed. Everything else is
/// acknowledged without effect.
pub fn parse_event(event: &WebhookEvent) -> WebhookAction {
    match event.event.as_str() {
        "qr_code.credited" => {
            let order_id = event
                .payload
                .qr_code
                .as_ref()
                .and_then(|qr| qr.entity.notes.order_id.clone());
            let payment = event.payload.payment.as_ref().map(|p| &p.entity);
            match order_id {
                Some(order_id) => WebhookAction::MarkPaid {
                    order_id,
                    payment_id: payment.and_then(|p| p.id.clone()),
                    amount: payment.and_then(|p| p.amount).unwrap_or(0) as f64 / 100.0,
                },
                None => WebhookAction::Acknowledge(event.event.clone()),
            }
        }
        "payment.captured" => {
            let payment = event.payload.payment.as_ref().map(|p| &p.entity);
            match payment.and_then(|p| p.notes.order_id.clone()) {
                Some(order_id) => WebhookAction::MarkPaid {
                    order_id,
                    payment_id: payment.and_then(|p| p.id.clone()),
                    amount: payment.and_then(|p| p.amount).unwrap_or(0) as f64 / 100.0,
                },
                None => WebhookAction::Acknowledge(event.event.clone()),
            }
        }
        "payment.failed" => {
            let payment = event.payload.payment.as_ref().map(|p| &p.entity);
            match payment.and_then(|p| p.notes.order_id.clone()) {
                Some(order_id) => WebhookAction::MarkFailed {
                    order_id,
                    payment_id: payment.and_then(|p| p.id.clone()),
                },
                None => WebhookAction::Acknowledge(event.event.clone()),
            }
        }
        other => WebhookAction::Acknowledge(other.to_string()),
    }
}

/// The body is taken raw so that even an unparseable payload is acknowledged
/// with 200; failure detail only ever reaches the log.
pub async fn razorpay_webhook(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Json<serde_json::Value> {
    let event = match serde_json::from_str::<WebhookEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("[webhook] Unparseable webhook payload: {}", e);
            return Json(serde_json::json!({
                "success": true,
                "message": "Webhook received"
            }));
        }
    };

    info!("[webhook] Razorpay event: {}", event.event);

    match parse_event(&event) {
        WebhookAction::MarkPaid {
            order_id,
            payment_id,
            amount,
        } => {
            let changes = OrderChanges {
                payment_status: Some("paid".to_string()),
                payment_id: payment_id.clone(),
                payment_amount: Some(amount),
                ..Default::default()
            };
            match apply_update(&state, &order_id, &changes) {
                Ok(updated) => {
                    if updated > 0 {
                        info!("[webhook] Order {} marked as paid", order_id);
                    } else {
                        warn!("[webhook] Paid event for unknown order {}", order_id);
                    }
                    state
                        .registry
                        .broadcast_payment_update(&order_id, payment_id.as_deref(), amount, "paid");
                    state.registry.broadcast_orders_update();
                }
                Err(e) => error!("[webhook] Database update failed for {}: {}", order_id, e),
            }
            Json(serde_json::json!({
                "success": true,
                "message": "Webhook processed successfully"
            }))
        }
        WebhookAction::MarkFailed {
            order_id,
            payment_id,
        } => {
            let changes = OrderChanges {
                payment_status: Some("failed".to_string()),
                payment_id: payment_id.clone(),
                ..Default::default()
            };
            match apply_update(&state, &order_id, &changes) {
                Ok(_) => {
                    info!("[webhook] Order {} marked as failed", order_id);
                    state
                        .registry
                        .broadcast_payment_update(&order_id, payment_id.as_deref(), 0.0, "failed");
                    state.registry.broadcast_orders_update();
                }
                Err(e) => error!("[webhook] Database update failed for {}: {}", order_id, e),
            }
            Json(serde_json::json!({
                "success": true,
                "message": "Webhook processed successfully"
            }))
        }
        WebhookAction::Acknowledge(event_name) => {
            info!("[webhook] Unhandled event: {}", event_name);
            Json(serde_json::json!({
                "success": true,
                "message": "Event received"
            }))
        }
    }
}

fn apply_update(
    state: &AppState,
    order_id: &str,
    changes: &OrderChanges,
) -> Result<usize, anyhow::Error> {
    let mut conn = state.conn.get()?;
    Ok(db::update_order_by_id(&mut conn, order_id, changes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_credited_event_maps_to_paid() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "qr_code.credited",
                "payload": {
                    "qr_code": {
                        "entity": {
                            "id": "qr_test_123456",
                            "notes": {"order_id": "BB1753493855391"}
                        }
                    },
                    "payment": {
                        "entity": {
                            "id": "pay_test_789012",
                            "amount": 2500,
                            "status": "captured"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            parse_event(&event),
            WebhookAction::MarkPaid {
                order_id: "BB1753493855391".to_string(),
                payment_id: Some("pay_test_789012".to_string()),
                amount: 25.0,
            }
        );
    }

    #[test]
    fn payment_captured_is_a_backup_paid_path() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "payment.captured",
                "payload": {
                    "payment": {
                        "entity": {
                            "id": "pay_test_captured_789",
                            "amount": 1000,
                            "notes": {"order_id": "BB1753493855391"},
                            "status": "captured"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            parse_event(&event),
            WebhookAction::MarkPaid {
                order_id: "BB1753493855391".to_string(),
                payment_id: Some("pay_test_captured_789".to_string()),
                amount: 10.0,
            }
        );
    }

    #[test]
    fn payment_failed_maps_to_failed() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "payment.failed",
                "payload": {
                    "payment": {
                        "entity": {
                            "id": "pay_test_failed_123",
                            "notes": {"order_id": "BB1753493855391"},
                            "status": "failed"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            parse_event(&event),
            WebhookAction::MarkFailed {
                order_id: "BB1753493855391".to_string(),
                payment_id: Some("pay_test_failed_123".to_string()),
            }
        );
    }

    #[test]
    fn unknown_events_are_acknowledged_without_effect() {
        let event: WebhookEvent =
            serde_json::from_str(r#"{"event": "refund.created", "payload": {}}"#).unwrap();
        assert_eq!(
            parse_event(&event),
            WebhookAction::Acknowledge("refund.created".to_string())
        );
    }

    #[test]
    fn credited_event_without_order_id_is_ignored() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "qr_code.credited",
                "payload": {
                    "qr_code": {"entity": {"id": "qr_1", "notes": {}}},
                    "payment": {"entity": {"id": "pay_1", "amount": 100}}
                }
            }"#,
        )
        .unwrap();
        assert!(matches!(parse_event(&event), WebhookAction::Acknowledge(_)));
    }

    #[test]
    fn camel_case_order_id_notes_are_accepted() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "event": "payment.captured",
                "payload": {
                    "payment": {
                        "entity": {"id": "pay_2", "amount": 2000, "notes": {"orderId": "BB42"}}
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            parse_event(&event),
            WebhookAction::MarkPaid {
                order_id: "BB42".to_string(),
                payment_id: Some("pay_2".to_string()),
                amount: 20.0,
            }
        );
    }
}
