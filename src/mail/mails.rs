use super::sendmail::{MailError, Mailer, OutgoingMail};

const VERIFICATION_TEMPLATE: &str = include_str!("templates/verification-email.html");
const FAVORITE_TEMPLATE: &str = include_str!("templates/favorite-notification.html");

/// Replace each `{{key}}` in the template with its value
pub fn render_template(template: &str, placeholders: &[(&str, &str)]) -> String {
    let mut html = template.to_string();
    for (key, value) in placeholders {
        html = html.replace(&format!("{{{{{}}}}}", key), value);
    }
    html
}

pub fn verification_link(site_url: &str, token: &str) -> String {
    format!("{}/accounts/verify-email/{}/", site_url, token)
}

pub async fn send_verification_email(
    mailer: &Mailer,
    to_email: &str,
    full_name: &str,
    token: &str,
    site_url: &str,
) -> Result<(), MailError> {
    let link = verification_link(site_url, token);
    let html = render_template(
        VERIFICATION_TEMPLATE,
        &[("full_name", full_name), ("verification_link", &link)],
    );

    mailer
        .send(OutgoingMail {
            to: to_email.to_string(),
            subject: "Verify your email address".to_string(),
            html,
        })
        .await
}

pub async fn send_favorite_email(
    mailer: &Mailer,
    to_email: &str,
    full_name: &str,
    blog_title: &str,
    author_name: &str,
    site_url: &str,
) -> Result<(), MailError> {
    let favorites_link = format!("{}/accounts/favorites/", site_url);
    let html = render_template(
        FAVORITE_TEMPLATE,
        &[
            ("full_name", full_name),
            ("blog_title", blog_title),
            ("author_name", author_name),
            ("favorites_link", &favorites_link),
        ],
    );

    mailer
        .send(OutgoingMail {
            to: to_email.to_string(),
            subject: format!("You favorited: {}", blog_title),
            html,
        })
        .await
}
