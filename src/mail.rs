use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::EmailConfig;

/// Send the report as plain text to every configured recipient over a
/// STARTTLS-upgraded, authenticated SMTP session. Exactly one attempt; the
/// caller decides what a failure means (it never aborts the run).
pub fn send_report(email: &EmailConfig, subject: &str, body: &str) -> Result<(), String> {
    let mut builder = Message::builder().from(
        email
            .from_address
            .parse()
            .map_err(|e| format!("Invalid sender email address: {e}"))?,
    );

    for addr in &email.to_addresses {
        let addr = addr.trim();
        if addr.is_empty() {
            continue;
        }
        builder = builder.to(addr
            .parse()
            .map_err(|e| format!("Invalid recipient email address '{addr}': {e}"))?);
    }

    let message = builder
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| format!("Failed to build email message: {e}"))?;

    // relay() defaults to STARTTLS on the submission port
    let mailer = SmtpTransport::relay(&email.smtp_server)
        .map_err(|e| format!("SMTP relay error: {e}"))?
        .port(email.smtp_port)
        .credentials(Credentials::new(
            email.username.clone(),
            email.password.clone(),
        ))
        .build();

    mailer
        .send(&message)
        .map(|_| ())
        .map_err(|e| format!("SMTP error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_config(from: &str, to: Vec<&str>) -> EmailConfig {
        EmailConfig {
            smtp_server: "mail.example.com".to_string(),
            smtp_port: 587,
            username: "user".to_string(),
            password: "pass".to_string(),
            from_address: from.to_string(),
            to_addresses: to.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn invalid_sender_is_reported_before_any_network_io() {
        let cfg = email_config("not-an-address", vec!["admin@example.com"]);
        let err = send_report(&cfg, "subject", "body").unwrap_err();
        assert!(err.contains("Invalid sender"));
    }

    #[test]
    fn invalid_recipient_names_the_address() {
        let cfg = email_config("zfs@example.com", vec!["admin@example.com", "broken"]);
        let err = send_report(&cfg, "subject", "body").unwrap_err();
        assert!(err.contains("'broken'"));
    }
}
