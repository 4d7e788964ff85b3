//! Signed session resume tokens.
//!
//! `HMAC-SHA256(session_id:worker_name:expiry, session_secret)`, carried as
//! `<expiry>.<hex mac>`. The worker gets the token in `hello_ack` and
//! presents it on resume; expiry bounds the resume grace window.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, KeyInit, Mac};
use meridian_core::{SessionId, WorkerName};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

fn mac_hex(session_id: SessionId, worker_name: &WorkerName, expiry: i64, secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(format!("{session_id}:{worker_name}:{expiry}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issue a resume token valid until `expires_at`.
#[must_use]
pub fn issue(
    session_id: SessionId,
    worker_name: &WorkerName,
    expires_at: DateTime<Utc>,
    secret: &[u8],
) -> String {
    let expiry = expires_at.timestamp();
    format!("{expiry}.{}", mac_hex(session_id, worker_name, expiry, secret))
}

/// Verify a resume token for the given session and worker at `now`.
pub fn verify(
    token: &str,
    session_id: SessionId,
    worker_name: &WorkerName,
    now: DateTime<Utc>,
    secret: &[u8],
) -> Result<(), GatewayError> {
    let (expiry_raw, mac_raw) = token
        .split_once('.')
        .ok_or(GatewayError::ResumeRejected("malformed token"))?;
    let expiry: i64 = expiry_raw
        .parse()
        .map_err(|_| GatewayError::ResumeRejected("malformed expiry"))?;

    let expected = mac_hex(session_id, worker_name, expiry, secret);
    let matches: bool = expected.as_bytes().ct_eq(mac_raw.as_bytes()).into();
    if !matches {
        return Err(GatewayError::ResumeRejected("bad signature"));
    }

    let expires_at = Utc
        .timestamp_opt(expiry, 0)
        .single()
        .ok_or(GatewayError::ResumeRejected("malformed expiry"))?;
    if now > expires_at {
        return Err(GatewayError::ResumeRejected("token expired"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"dev-session-secret";

    fn worker() -> WorkerName {
        WorkerName::new("worker-1").unwrap()
    }

    #[test]
    fn issue_and_verify() {
        let session = SessionId::v4();
        let expires = Utc::now() + chrono::Duration::seconds(3600);
        let token = issue(session, &worker(), expires, SECRET);
        assert!(verify(&token, session, &worker(), Utc::now(), SECRET).is_ok());
    }

    #[test]
    fn rejects_wrong_session() {
        let expires = Utc::now() + chrono::Duration::seconds(3600);
        let token = issue(SessionId::v4(), &worker(), expires, SECRET);
        let err = verify(&token, SessionId::v4(), &worker(), Utc::now(), SECRET).unwrap_err();
        assert!(err.to_string().contains("bad signature"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let session = SessionId::v4();
        let expires = Utc::now() + chrono::Duration::seconds(3600);
        let token = issue(session, &worker(), expires, SECRET);
        assert!(verify(&token, session, &worker(), Utc::now(), b"other").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let session = SessionId::v4();
        let expires = Utc::now() - chrono::Duration::seconds(1);
        let token = issue(session, &worker(), expires, SECRET);
        let err = verify(&token, session, &worker(), Utc::now(), SECRET).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn rejects_tampered_token() {
        let session = SessionId::v4();
        let expires = Utc::now() + chrono::Duration::seconds(3600);
        let token = issue(session, &worker(), expires, SECRET);
        let tampered = format!("{token}ff");
        assert!(verify(&tampered, session, &worker(), Utc::now(), SECRET).is_err());
        assert!(verify("garbage", session, &worker(), Utc::now(), SECRET).is_err());
    }
}
