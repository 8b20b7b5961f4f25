//! Security event audit logging.
//!
//! Every security-relevant outcome (token issuance, reuse detection,
//! lockouts, proof failures) is recorded as a structured tracing event
//! under the `audit` target with enough context for forensic review:
//! subject, client, ip, reason, and a correlation id. The HTTP
//! responses for these outcomes are deliberately generic; the audit
//! trail is where the detail lives.
//!
//! Deployments route the `audit` target to durable storage through
//! their subscriber configuration.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::Subject;

/// Classes of auditable security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    /// An access/ID token was issued.
    TokenIssued,
    /// A token request was rejected.
    TokenRejected,
    /// A new refresh family was created.
    RefreshFamilyIssued,
    /// A refresh token was rotated or slid.
    RefreshRotated,
    /// A refresh presentation was rejected (not found, expired).
    RefreshRejected,
    /// Reuse of a rotated/revoked refresh token was detected.
    RefreshReuseDetected,
    /// A refresh family was revoked.
    RefreshFamilyRevoked,
    /// A login attempt failed credential verification.
    LoginFailed,
    /// A login attempt succeeded.
    LoginSucceeded,
    /// A subject was locked out.
    AccountLocked,
    /// An attempt was rejected by an active lock.
    LockoutRejected,
    /// An attempt was rejected pending CAPTCHA verification.
    CaptchaGateRejected,
    /// A device proof failed verification.
    DeviceProofRejected,
    /// A device proof verified successfully.
    DeviceProofAccepted,
    /// A signing key was provisioned or rotated.
    KeyRotated,
}

impl AuditKind {
    /// Returns the event kind as a stable string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenIssued => "token_issued",
            Self::TokenRejected => "token_rejected",
            Self::RefreshFamilyIssued => "refresh_family_issued",
            Self::RefreshRotated => "refresh_rotated",
            Self::RefreshRejected => "refresh_rejected",
            Self::RefreshReuseDetected => "refresh_reuse_detected",
            Self::RefreshFamilyRevoked => "refresh_family_revoked",
            Self::LoginFailed => "login_failed",
            Self::LoginSucceeded => "login_succeeded",
            Self::AccountLocked => "account_locked",
            Self::LockoutRejected => "lockout_rejected",
            Self::CaptchaGateRejected => "captcha_gate_rejected",
            Self::DeviceProofRejected => "device_proof_rejected",
            Self::DeviceProofAccepted => "device_proof_accepted",
            Self::KeyRotated => "key_rotated",
        }
    }
}

/// A structured audit event, built up and then recorded once.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    kind: AuditKind,
    correlation_id: Uuid,
    at: OffsetDateTime,
    subject: Option<Subject>,
    client_id: Option<String>,
    ip: Option<String>,
    details: Vec<(&'static str, String)>,
}

impl AuditEvent {
    /// Starts a new event of the given kind with a fresh correlation id.
    #[must_use]
    pub fn new(kind: AuditKind) -> Self {
        Self {
            kind,
            correlation_id: Uuid::new_v4(),
            at: OffsetDateTime::now_utc(),
            subject: None,
            client_id: None,
            ip: None,
            details: Vec::new(),
        }
    }

    /// Attaches the subject.
    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Attaches the client id.
    #[must_use]
    pub fn client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    /// Attaches the caller's IP address.
    #[must_use]
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attaches a free-form key/value detail.
    #[must_use]
    pub fn detail(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.details.push((key, value.into()));
        self
    }

    /// Returns this event's correlation id, for echoing into generic
    /// `server_error` responses.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Emits the event to the `audit` tracing target.
    pub fn record(self) {
        // Details are folded into one field; the stable fields get
        // their own columns for filtering.
        let details = self
            .details
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(
            target: "audit",
            event = self.kind.as_str(),
            correlation_id = %self.correlation_id,
            at = %self.at,
            subject = self.subject.map(|s| s.to_string()),
            client_id = self.client_id,
            ip = self.ip,
            %details,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(AuditKind::TokenIssued.as_str(), "token_issued");
        assert_eq!(
            AuditKind::RefreshReuseDetected.as_str(),
            "refresh_reuse_detected"
        );
        assert_eq!(AuditKind::AccountLocked.as_str(), "account_locked");
    }

    #[test]
    fn test_builder_accumulates_context() {
        let subject = Subject::User(Uuid::new_v4());
        let event = AuditEvent::new(AuditKind::LoginFailed)
            .subject(subject)
            .client("web-app")
            .ip("203.0.113.7")
            .detail("reason", "bad_password");

        assert_eq!(event.subject, Some(subject));
        assert_eq!(event.client_id.as_deref(), Some("web-app"));
        assert_eq!(event.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(event.details.len(), 1);

        // Recording must not panic without a subscriber installed.
        event.record();
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = AuditEvent::new(AuditKind::TokenIssued);
        let b = AuditEvent::new(AuditKind::TokenIssued);
        assert_ne!(a.correlation_id(), b.correlation_id());
    }
}
