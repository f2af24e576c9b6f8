use lettre::{
    Message, SmtpTransport, Transport,
    message::{SinglePart, header},
    transport::smtp::authentication::Credentials,
};

#[cfg(test)]
use std::sync::{Arc, Mutex};

use crate::config::Config;

pub type MailError = Box<dyn std::error::Error + Send + Sync>;

/// A rendered message as handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Clone)]
enum Backend {
    /// STARTTLS relay
    Smtp(SmtpTransport),
    /// Logs the message instead of delivering it
    Console,
    #[cfg(test)]
    Outbox(Arc<Mutex<Vec<OutgoingMail>>>),
    #[cfg(test)]
    Failing,
}

/// Transactional mail sender shared through `AppState`
#[derive(Clone)]
pub struct Mailer {
    backend: Backend,
    from: String,
}

impl Mailer {
    /// SMTP when the relay is configured, console otherwise
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let backend = match &config.smtp {
            Some(smtp) => {
                let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
                let transport = SmtpTransport::starttls_relay(&smtp.server)?
                    .credentials(creds)
                    .port(smtp.port)
                    .build();
                tracing::info!(server = %smtp.server, port = smtp.port, "SMTP mail backend");
                Backend::Smtp(transport)
            }
            None => {
                tracing::info!("SMTP not configured, using console mail backend");
                return Ok(Mailer::console(&config.default_from_email));
            }
        };

        Ok(Mailer {
            backend,
            from: config.default_from_email.clone(),
        })
    }

    pub fn console(from: &str) -> Self {
        Mailer {
            backend: Backend::Console,
            from: from.to_string(),
        }
    }

    #[cfg(test)]
    pub fn outbox() -> (Self, Arc<Mutex<Vec<OutgoingMail>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mailer = Mailer {
            backend: Backend::Outbox(sent.clone()),
            from: "noreply@blogsite.local".to_string(),
        };
        (mailer, sent)
    }

    #[cfg(test)]
    pub fn failing() -> Self {
        Mailer {
            backend: Backend::Failing,
            from: "noreply@blogsite.local".to_string(),
        }
    }

    /// Send an HTML email and wait for the backend to finish.
    /// SMTP delivery runs on the blocking pool.
    pub async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        match &self.backend {
            Backend::Smtp(transport) => {
                let email = Message::builder()
                    .from(self.from.parse()?)
                    .to(mail.to.parse()?)
                    .subject(mail.subject.as_str())
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(mail.html),
                    )?;

                let transport = transport.clone();
                tokio::task::spawn_blocking(move || transport.send(&email)).await??;
                tracing::info!(to = %mail.to, subject = %mail.subject, "Email sent");
                Ok(())
            }
            Backend::Console => {
                tracing::info!(
                    from = %self.from,
                    to = %mail.to,
                    subject = %mail.subject,
                    "Email (console backend)\n{}",
                    mail.html
                );
                Ok(())
            }
            #[cfg(test)]
            Backend::Outbox(sent) => {
                sent.lock().unwrap().push(mail);
                Ok(())
            }
            #[cfg(test)]
            Backend::Failing => Err("mail backend unavailable".into()),
        }
    }
}
