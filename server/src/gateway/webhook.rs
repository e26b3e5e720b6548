//! Webhook signing and decoding.
//!
//! Events use the Stripe envelope and `Stripe-Signature` scheme:
//! `t=<unix>,v1=<hex hmac-sha256 of "<t>.<payload>">`.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use super::{GatewayError, GatewayResult};

/// Events older (or newer) than this are rejected as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded {
        transaction_id: String,
        ticket_id: Option<Uuid>,
    },
    PaymentFailed {
        transaction_id: String,
        ticket_id: Option<Uuid>,
        reason: Option<String>,
    },
    SetupSucceeded {
        customer_id: String,
        payment_method_id: String,
        user_id: Option<Uuid>,
    },
    Other,
}

fn mac(secret: &str, timestamp: &str, payload: &[u8]) -> GatewayResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::InvalidSignature("HMAC key error".to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds the signature header a sender would attach to `payload`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> GatewayResult<String> {
    let ts = timestamp.to_string();
    let digest = mac(secret, &ts, payload)?.finalize().into_bytes();
    Ok(format!("t={ts},v1={}", hex::encode(digest)))
}

pub fn verify(payload: &[u8], header: &str, secret: &str) -> GatewayResult<()> {
    verify_at(payload, header, secret, chrono::Utc::now().timestamp())
}

pub fn verify_at(payload: &[u8], header: &str, secret: &str, now: i64) -> GatewayResult<()> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "Invalid signature header".to_string(),
        ));
    }

    let matched = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        mac(secret, timestamp, payload)
            .map(|m| m.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(GatewayError::InvalidSignature(
            "Webhook signature mismatch".to_string(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| GatewayError::InvalidSignature("Invalid timestamp".to_string()))?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(GatewayError::InvalidSignature(
            "Webhook timestamp outside tolerance".to_string(),
        ));
    }

    Ok(())
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawPaymentIntent {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawSetupIntent {
    customer: Option<String>,
    payment_method: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn metadata_uuid(metadata: &HashMap<String, String>, key: &str) -> Option<Uuid> {
    metadata.get(key).and_then(|v| Uuid::parse_str(v).ok())
}

fn object<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> GatewayResult<T> {
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
}

/// Decodes an already verified payload.
pub fn parse_event(payload: &[u8]) -> GatewayResult<WebhookEvent> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;

    let kind = match raw.event_type.as_str() {
        "payment_intent.succeeded" => {
            let intent: RawPaymentIntent = object(raw.data.object)?;
            WebhookEventKind::PaymentSucceeded {
                ticket_id: metadata_uuid(&intent.metadata, "ticket_id"),
                transaction_id: intent.id,
            }
        }
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            let intent: RawPaymentIntent = object(raw.data.object)?;
            let reason = intent
                .last_payment_error
                .and_then(|e| e.decline_code.or(e.code).or(e.message));
            WebhookEventKind::PaymentFailed {
                ticket_id: metadata_uuid(&intent.metadata, "ticket_id"),
                transaction_id: intent.id,
                reason,
            }
        }
        "setup_intent.succeeded" => {
            let intent: RawSetupIntent = object(raw.data.object)?;
            let (Some(customer_id), Some(payment_method_id)) =
                (intent.customer, intent.payment_method)
            else {
                return Err(GatewayError::InvalidPayload(
                    "setup intent without customer or payment method".to_string(),
                ));
            };
            WebhookEventKind::SetupSucceeded {
                user_id: metadata_uuid(&intent.metadata, "user_id"),
                customer_id,
                payment_method_id,
            }
        }
        _ => WebhookEventKind::Other,
    };

    Ok(WebhookEvent {
        id: raw.id,
        event_type: raw.event_type,
        kind,
    })
}
