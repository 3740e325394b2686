//! Webhook signature verification and the tagged-union event shape
//! `processWebhook` dispatches on.

use chrono::{DateTime, Utc};
use dispatch_codec::{RemotePayload, RemoteState};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Result, SyncError};

type HmacSha256 = Hmac<Sha256>;

/// Verify `X-Hub-Signature-256: sha256=<hex>` against `secret` and the raw
/// request body. Constant-time comparison so response timing doesn't leak
/// how many leading bytes matched.
pub fn verify_signature(secret: &[u8], raw_body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();
    if computed.len() != expected.len() {
        return false;
    }
    computed.as_slice().ct_eq(&expected).into()
}

/// A decoded `issues` webhook event, the only `kind` the Sync Engine acts
/// on today. Other kinds deserialize fine but `event_kind()` tags them as
/// `Other`, which `process_webhook` treats as a no-op.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: String,
    pub action: String,
    pub delivery_id: String,
    pub payload: IssuesEventPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuesEventPayload {
    pub action: String,
    pub issue: RemoteIssuePayload,
    pub repository: RepositoryPayload,
    #[serde(default)]
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationPayload {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    pub name: String,
    pub owner: OwnerPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIssuePayload {
    pub number: u64,
    pub html_url: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelPayload>,
    pub state: String,
    #[serde(default)]
    pub assignees: Vec<AssigneePayload>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssigneePayload {
    pub login: String,
}

impl RemoteIssuePayload {
    pub fn to_remote_payload(&self) -> RemotePayload {
        RemotePayload {
            title: self.title.clone(),
            body: self.body.clone().unwrap_or_default(),
            labels: self.labels.iter().map(|l| l.name.clone()).collect(),
            state: if self.state == "closed" { RemoteState::Closed } else { RemoteState::Open },
            assignees: self.assignees.iter().map(|a| a.login.clone()).collect(),
        }
    }
}

/// Parse a webhook body into the event envelope. `event_kind` comes from
/// the `X-GitHub-Event` header; the rest of the envelope lives in the JSON
/// body.
pub fn parse_event(event_kind: &str, delivery_id: &str, raw_body: &[u8]) -> Result<WebhookEvent> {
    let payload: IssuesEventPayload = serde_json::from_slice(raw_body).map_err(SyncError::Serialization)?;
    Ok(WebhookEvent {
        kind: event_kind.to_string(),
        action: payload.action.clone(),
        delivery_id: delivery_id.to_string(),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_round_trips() {
        let secret = b"topsecret";
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert!(verify_signature(secret, body, &header));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = b"topsecret";
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(b"original");
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert!(!verify_signature(secret, b"tampered", &header));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        assert!(!verify_signature(b"s", b"body", "not-a-signature"));
    }
}
