mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod mail;
mod middleware;
mod models;
mod redisdb;
mod routes;
mod tracing_config;
mod utils;

use axum::http::{
    HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use config::Config;
use db::DBClient;
use dotenv::dotenv;
use mail::Mailer;
use redisdb::RedisClient;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_config::init_tracing;

use axum_client_ip::ClientIpSource;
use std::net::SocketAddr;

#[derive(Clone)]
pub struct AppState {
    pub env: Arc<Config>,
    pub db_client: db::DBClient,
    pub redis_client: redisdb::RedisClient,
    pub mailer: Mailer,
    pub ip_extraction: ClientIpSource,
}

#[tokio::main]
async fn main() {
    let _guard = init_tracing();

    dotenv().ok();

    let config = Config::init();

    let ip_source = if cfg!(debug_assertions) {
        ClientIpSource::ConnectInfo
    } else {
        ClientIpSource::CfConnectingIp
    };

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);

    if let Err(err) = db_client.migrate().await {
        tracing::error!("Failed to run migrations: {}", err);
        std::process::exit(1);
    }

    if let Some(admin) = &config.admin {
        match handler::accounts::ensure_admin(&db_client, admin).await {
            Ok(Some(user)) => tracing::info!(user_id = %user.id, "Admin account created"),
            Ok(None) => tracing::debug!("Admin account already exists"),
            Err(err) => {
                tracing::error!("Failed to create admin account: {}", err);
                std::process::exit(1);
            }
        }
    }

    let frontend_origin = match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => origin,
        Err(err) => {
            tracing::error!("Invalid FRONTEND_URL: {}", err);
            std::process::exit(1);
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(frontend_origin)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    //redis
    let manager = match redis::Client::open(config.redis_url.clone()) {
        Ok(client) => client.get_connection_manager().await,
        Err(err) => Err(err),
    };
    let redis_client = match manager {
        Ok(manager) => RedisClient::new(manager),
        Err(err) => {
            tracing::error!("Failed to connect to redis: {}", err);
            std::process::exit(1);
        }
    };

    let mailer = match Mailer::from_config(&config) {
        Ok(mailer) => mailer,
        Err(err) => {
            tracing::error!("Failed to set up mail backend: {}", err);
            std::process::exit(1);
        }
    };

    let app_state = AppState {
        env: Arc::new(config.clone()),
        db_client,
        redis_client,
        mailer,
        ip_extraction: ip_source,
    };

    let app = routes::create_router(app_state).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", err);
    }
}
