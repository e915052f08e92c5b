//! Webhook signature verification.
//!
//! The processor signs each delivery with HMAC-SHA256 over `"{timestamp}.{payload}"`
//! using the shared webhook secret, and sends `t=<unix seconds>,v1=<hex digest>` in
//! the signature header. Several `v1` entries may be present while secrets rotate.

use crate::config::Secret;
use crate::domain::webhook::ProcessorEvent;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: Option<Secret<String>>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: Option<Secret<String>>, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<ProcessorEvent> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            PaymentError::InvalidSignature("webhook signing secret not configured".to_string())
        })?;
        let (timestamp, signatures) = parse_header(signature_header)?;

        let age = Utc::now().timestamp().abs_diff(timestamp);
        if age > self.tolerance.as_secs() {
            warn!("🔐️ Webhook timestamp is {age}s away from now. Rejecting delivery.");
            return Err(PaymentError::InvalidSignature(
                "timestamp outside the tolerance window".to_string(),
            ));
        }

        let mac = mac_for(secret.reveal(), timestamp, payload)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .is_ok_and(|expected| mac.clone().verify_slice(&expected).is_ok())
        });
        if !matched {
            warn!("🔐️ No webhook signature matched. Rejecting delivery.");
            return Err(PaymentError::InvalidSignature(
                "no signature matched the payload".to_string(),
            ));
        }

        serde_json::from_slice(payload).map_err(|e| {
            PaymentError::ValidationError(format!("malformed webhook payload: {e}"))
        })
    }

    /// Produces a header the way the processor does. Fails if no secret is configured.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            PaymentError::InvalidSignature("webhook signing secret not configured".to_string())
        })?;
        let digest = mac_for(secret.reveal(), timestamp, payload)?
            .finalize()
            .into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::internal(format!("cannot key webhook HMAC: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

fn parse_header(header: &str) -> Result<(i64, Vec<&str>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(PaymentError::InvalidSignature(
            "malformed signature header".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::{IntentObject, NotificationKind};

    fn verifier(secret: Option<&str>) -> WebhookVerifier {
        WebhookVerifier::new(
            secret.map(|s| Secret::new(s.to_string())),
            Duration::from_secs(300),
        )
    }

    fn payload() -> Vec<u8> {
        let event = ProcessorEvent::new(
            "evt_1",
            NotificationKind::Succeeded,
            IntentObject {
                id: "pi_1".into(),
                client_secret: None,
            },
        );
        serde_json::to_vec(&event).unwrap()
    }

    #[test]
    fn test_signed_payload_verifies() {
        let v = verifier(Some("whsec_test"));
        let body = payload();
        let header = v.sign(&body, Utc::now().timestamp()).unwrap();
        let event = v.verify(&body, &header).unwrap();
        assert_eq!(event.kind(), NotificationKind::Succeeded);
        assert_eq!(event.intent().id, "pi_1");
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let signer = verifier(Some("whsec_test"));
        let body = payload();
        let header = signer.sign(&body, Utc::now().timestamp()).unwrap();
        let result = verifier(None).verify(&body, &header);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = payload();
        let header = verifier(Some("other")).sign(&body, Utc::now().timestamp()).unwrap();
        let result = verifier(Some("whsec_test")).verify(&body, &header);
        assert!(matches!(result, Err(PaymentError::InvalidSignature(_))));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let v = verifier(Some("whsec_test"));
        let body = payload();
        let header = v.sign(&body, Utc::now().timestamp()).unwrap();
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");
        assert!(v.verify(&tampered, &header).is_err());
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let v = verifier(Some("whsec_test"));
        let body = payload();
        let header = v.sign(&body, Utc::now().timestamp() - 3600).unwrap();
        assert!(matches!(
            v.verify(&body, &header),
            Err(PaymentError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_any_matching_v1_entry_is_accepted() {
        let v = verifier(Some("whsec_test"));
        let body = payload();
        let now = Utc::now().timestamp();
        let good = v.sign(&body, now).unwrap();
        let digest = good.split_once("v1=").unwrap().1;
        let header = format!("t={now},v1=deadbeef,v1={digest}");
        assert!(v.verify(&body, &header).is_ok());
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let v = verifier(Some("whsec_test"));
        assert!(v.verify(&payload(), "garbage").is_err());
        assert!(v.verify(&payload(), "t=123").is_err());
    }
}
