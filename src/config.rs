/// SMTP relay settings. Without them mail goes to the console backend.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Credentials for the admin account created at startup
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub refresh_token_maxage: i64,
    pub redis_url: String,
    pub port: u16,
    pub site_url: String, // absolute base for links in emails
    pub frontend_url: String,
    pub media_root: String,
    pub default_from_email: String,
    pub smtp: Option<SmtpConfig>,
    pub admin: Option<AdminConfig>,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");
        let refresh_token_maxage =
            std::env::var("REFRESH_TOKEN_MAXAGE").expect("REFRESH_TOKEN_MAXAGE must be set");
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        let site_url = std::env::var("SITE_URL").expect("SITE_URL must be set");
        let frontend_url = std::env::var("FRONTEND_URL").expect("FRONTEND_URL must be set");

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8000);
        let media_root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string());
        let default_from_email = std::env::var("DEFAULT_FROM_EMAIL")
            .unwrap_or_else(|_| "noreply@blogsite.local".to_string());

        let smtp = match (
            std::env::var("SMTP_SERVER"),
            std::env::var("SMTP_USERNAME"),
            std::env::var("SMTP_PASSWORD"),
        ) {
            (Ok(server), Ok(username), Ok(password)) => Some(SmtpConfig {
                server,
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(587),
                username,
                password,
            }),
            _ => None,
        };

        let admin = match (
            std::env::var("ADMIN_USERNAME"),
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(AdminConfig {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Config {
            database_url,
            jwt_secret,
            jwt_maxage: jwt_maxage
                .parse::<i64>()
                .expect("JWT_MAXAGE must be a number of seconds"),
            refresh_token_maxage: refresh_token_maxage
                .parse::<i64>()
                .expect("REFRESH_TOKEN_MAXAGE must be a number of seconds"),
            redis_url,
            port,
            site_url: site_url.trim_end_matches('/').to_string(),
            frontend_url,
            media_root,
            default_from_email,
            smtp,
            admin,
        }
    }
}
