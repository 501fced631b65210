//! # Mail
//!
//! Outgoing email for password resets.
//!
//! Messages are handed to an HTTP mail relay (`MAIL_URL`) as JSON with both an
//! HTML and a plain-text body. Without a relay, the message is written to the
//! log instead, which is what local development wants.
use std::sync::LazyLock;

use bank::models::User;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::error::AppError;

static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));
static BLANKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("blank pattern compiles"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("blank line pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: String) -> Self {
        let text = html_to_text(&html);

        Self {
            to: to.into(),
            subject: subject.into(),
            html,
            text,
        }
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

pub struct Mailer {
    client: Client,
    relay_url: Option<String>,
    from: String,
}

impl Mailer {
    pub fn new(relay_url: Option<String>, from: String) -> Self {
        Self {
            client: Client::new(),
            relay_url,
            from,
        }
    }

    pub async fn send(&self, email: &Email) -> Result<(), AppError> {
        let Some(relay_url) = &self.relay_url else {
            info!(
                "No mail relay configured, would send \"{}\" to {}:\n{}",
                email.subject, email.to, email.text
            );
            return Ok(());
        };

        let message = RelayMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        self.client
            .post(relay_url)
            .json(&message)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::InternalError(e.into()))?;

        info!("Sent \"{}\" to {}", email.subject, email.to);

        Ok(())
    }

    /// Like [`Mailer::send`], but a failure is logged instead of returned.
    ///
    /// Returns whether the message went out.
    pub async fn send_or_log(&self, email: &Email) -> bool {
        match self.send(email).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send \"{}\" to {}: {e}", email.subject, email.to);
                false
            }
        }
    }
}

pub fn password_reset(user: &User, reset_url: &str) -> Email {
    let html = format!(
        "<h2>Password Reset</h2>\n\
         <p>Hello {name},</p>\n\
         <p>You have requested a password reset. Please follow the link below to reset your password.</p>\n\
         <p><a href=\"{url}\">Reset my password</a></p>\n\
         <p>{url}</p>\n\
         <p>This link will expire within an hour. If you did not request this email, please ignore it.</p>",
        name = escape_html(&user.name),
        url = escape_html(reset_url),
    );

    Email::new(user.email.clone(), "Password Reset", html)
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_to_text(html: &str) -> String {
    let stripped = TAGS.replace_all(html, "");
    let decoded = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    let collapsed = BLANKS.replace_all(&decoded, " ");
    let collapsed = BLANK_LINES.replace_all(&collapsed, "\n");

    collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: "wes@example.com".to_string(),
            password_hash: String::new(),
            created: Utc::now(),
            reset_password_token: None,
            reset_password_expires: None,
        }
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>Hey I <strong>love</strong>   you</p>\n\n<p>&amp; more</p>"),
            "Hey I love you\n& more"
        );
    }

    #[test]
    fn test_password_reset_email() {
        let email = password_reset(&user("Wes <3"), "http://localhost/account/reset/abc");

        assert_eq!(email.to, "wes@example.com");
        assert_eq!(email.subject, "Password Reset");
        assert!(email.html.contains("Hello Wes &lt;3,"));
        assert!(email.html.contains("href=\"http://localhost/account/reset/abc\""));
        assert!(email.text.contains("Hello Wes <3,"));
        assert!(email.text.contains("http://localhost/account/reset/abc"));
        assert!(!email.text.contains("<p>"));
    }

    #[tokio::test]
    async fn test_send_without_relay_logs() {
        let mailer = Mailer::new(None, "noreply@storefront.local".to_string());
        let email = password_reset(&user("Wes"), "http://localhost/reset");

        assert!(mailer.send(&email).await.is_ok());
        assert!(mailer.send_or_log(&email).await);
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_logged_not_raised() {
        // nothing listens on the discard port
        let mailer = Mailer::new(
            Some("http://127.0.0.1:9/send".to_string()),
            "noreply@storefront.local".to_string(),
        );
        let email = password_reset(&user("Wes"), "http://localhost/reset");

        assert!(matches!(
            mailer.send(&email).await,
            Err(AppError::InternalError(_))
        ));
        assert!(!mailer.send_or_log(&email).await);
    }
}
