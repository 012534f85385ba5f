use crate::config::MailConfig;
use anyhow::Context;
use lettre::{
    message::Mailbox,
    transport::smtp::{
        authentication::Credentials, response::Response as LettreResponse, Error as LettreError,
    },
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    frontend_host: String,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Mailer> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .with_context(|| format!("invalid smtp host {}", config.smtp_host))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Mailer::with_transport(transport, config)
    }

    pub fn with_transport(
        transport: AsyncSmtpTransport<Tokio1Executor>,
        config: &MailConfig,
    ) -> anyhow::Result<Mailer> {
        let address = config
            .from_address
            .parse::<Address>()
            .with_context(|| format!("invalid sender address {}", config.from_address))?;

        Ok(Mailer {
            transport,
            from: Mailbox::new(Some(config.from_display.clone()), address),
            frontend_host: config.frontend_host.trim_end_matches('/').to_string(),
        })
    }

    pub fn frontend_host(&self) -> &str {
        &self.frontend_host
    }

    pub async fn sanity_check(&self) -> Result<bool, LettreError> {
        self.transport.test_connection().await
    }

    pub async fn send(&self, to: Mailbox, subject: &str, body: String) -> anyhow::Result<LettreResponse> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)?;

        Ok(self.transport.send(email).await?)
    }
}

pub fn password_reset_body(fname: &str, link: &str) -> String {
    format!(
        r"Hi {fname},

We have received a request to change your Student Club Portal password. To reset your password, open the link below within the next 24 hours (or paste it into your browser if clicking is not working):

{link}

If you did not request this password reset you can disregard this message and your password will remain unchanged.

Thanks,
The Student Club Portal Team."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 2525,
            smtp_username: "portal".to_string(),
            smtp_password: "secret".to_string(),
            from_address: "noreply@example.org".to_string(),
            from_display: "Student Club Portal".to_string(),
            frontend_host: "https://portal.example.org/".to_string(),
        }
    }

    #[test]
    fn trailing_slash_is_dropped_from_frontend_host() {
        let mailer = Mailer::with_transport(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost").build(),
            &config(),
        )
        .unwrap();
        assert_eq!(mailer.frontend_host(), "https://portal.example.org");
    }

    #[test]
    fn bad_sender_is_rejected() {
        let mut config = config();
        config.from_address = "not an address".to_string();
        assert!(Mailer::with_transport(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost").build(),
            &config,
        )
        .is_err());
    }

    #[test]
    fn reset_body_contains_link() {
        let body = password_reset_body("Ada", "https://portal.example.org/resetPassword?key=abc");
        assert!(body.starts_with("Hi Ada,"));
        assert!(body.contains("https://portal.example.org/resetPassword?key=abc"));
    }
}
