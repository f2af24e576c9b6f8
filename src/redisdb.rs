use redis::{AsyncCommands, aio::ConnectionManager};
use std::net::IpAddr;

/// Failed logins allowed per IP within `IP_WINDOW_SECS`
pub const MAX_IP_ATTEMPTS: u32 = 100;
const IP_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Failed logins allowed per identifier+IP within `IDENTIFIER_WINDOW_SECS`
pub const MAX_IDENTIFIER_ATTEMPTS: u32 = 10;
const IDENTIFIER_WINDOW_SECS: i64 = 60 * 60;

fn ip_key(ip: IpAddr) -> String {
    format!("login_attempts:ip:{}", ip)
}

fn identifier_ip_key(ip: IpAddr, identifier: &str) -> String {
    format!(
        "login_attempts:identifier:{}:{}",
        identifier.to_lowercase(),
        ip
    )
}

/// Whether either login counter has reached its limit
pub fn attempts_exceeded(ip_attempts: u32, identifier_ip_attempts: u32) -> bool {
    ip_attempts >= MAX_IP_ATTEMPTS || identifier_ip_attempts >= MAX_IDENTIFIER_ATTEMPTS
}

#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
}

impl RedisClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn save_refresh_token(
        &self,
        user_id: &str,
        refresh_token: &str,
        expires_in_seconds: i64,
    ) -> redis::RedisResult<()> {
        let key = format!("refresh:{}", user_id);
        // ConnectionManager clones share the same multiplexed connection
        let mut conn = self.conn.clone();
        conn.set_ex(key, refresh_token, expires_in_seconds as u64)
            .await
    }

    pub async fn get_refresh_token(&self, user_id: &str) -> redis::RedisResult<Option<String>> {
        let key = format!("refresh:{}", user_id);
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn delete_refresh_token(&self, user_id: &str) -> redis::RedisResult<()> {
        let key = format!("refresh:{}", user_id);
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    pub async fn get_ip_attempts(&self, ip: IpAddr) -> redis::RedisResult<Option<u32>> {
        let mut conn = self.conn.clone();
        conn.get(ip_key(ip)).await
    }

    pub async fn get_identifier_ip_attempts(
        &self,
        ip: IpAddr,
        identifier: &str,
    ) -> redis::RedisResult<Option<u32>> {
        let mut conn = self.conn.clone();
        conn.get(identifier_ip_key(ip, identifier)).await
    }

    /// Count one failed login against both counters. The window starts at
    /// the first failure.
    pub async fn increment_attempts(&self, ip: IpAddr, identifier: &str) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();

        let ip_key = ip_key(ip);
        let ip_count: u32 = conn.incr(&ip_key, 1).await?;
        if ip_count == 1 {
            let _: () = conn.expire(&ip_key, IP_WINDOW_SECS).await?;
        }

        let identifier_key = identifier_ip_key(ip, identifier);
        let identifier_count: u32 = conn.incr(&identifier_key, 1).await?;
        if identifier_count == 1 {
            let _: () = conn.expire(&identifier_key, IDENTIFIER_WINDOW_SECS).await?;
        }

        Ok(())
    }

    pub async fn delete_identifier_ip_attempts(
        &self,
        ip: IpAddr,
        identifier: &str,
    ) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.del(identifier_ip_key(ip, identifier)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_key_is_case_insensitive() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            identifier_ip_key(ip, "Ada@Example.com"),
            identifier_ip_key(ip, "ada@example.com")
        );
        assert_ne!(ip_key(ip), identifier_ip_key(ip, "ada"));
    }

    #[test]
    fn limits_trip_at_threshold() {
        assert!(!attempts_exceeded(0, 0));
        assert!(!attempts_exceeded(MAX_IP_ATTEMPTS - 1, MAX_IDENTIFIER_ATTEMPTS - 1));
        assert!(attempts_exceeded(MAX_IP_ATTEMPTS, 0));
        assert!(attempts_exceeded(0, MAX_IDENTIFIER_ATTEMPTS));
    }
}
