//! Best-effort external delivery channels.
//!
//! Email and support-ticket delivery are stubs wired to logging; the
//! dispatcher treats every failure here as non-critical. Nothing in this
//! module may influence transaction state.

use thiserror::Error;

/// Errors from external delivery channels.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("support ticket creation failed: {0}")]
    Support(String),
}

/// Send a notification email. Stub: logs the would-be delivery.
pub async fn send_email(to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
    tracing::info!(
        to = %to,
        subject = %subject,
        body_len = body.len(),
        "Email delivery (stub)"
    );
    Ok(())
}

/// Open a support ticket for a manual-review case. Stub: logs the payload.
pub async fn open_support_ticket(
    transaction_id: &str,
    reason: &str,
) -> Result<(), DeliveryError> {
    tracing::info!(
        transaction_id = %transaction_id,
        reason = %reason,
        "Support ticket (stub)"
    );
    Ok(())
}
