//! Environment-driven server configuration.

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;
const DEFAULT_REFRESH_GRACE_SECS: i64 = 7 * 24 * 60 * 60;

/// Initial admin account seeded at startup so a fresh deployment is
/// reachable.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    /// How far past expiry a token is still accepted as proof of identity by
    /// the refresh endpoint.
    pub refresh_grace_secs: i64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });

        let bootstrap_admin = match (
            std::env::var("MASTHEAD_ADMIN_USERNAME"),
            std::env::var("MASTHEAD_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(BootstrapAdmin { username, password }),
            _ => None,
        };

        Self {
            bind_addr: std::env::var("MASTHEAD_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret,
            token_ttl_secs: env_i64("MASTHEAD_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS),
            refresh_grace_secs: env_i64("MASTHEAD_REFRESH_GRACE_SECS", DEFAULT_REFRESH_GRACE_SECS),
            bootstrap_admin,
        }
    }

    /// Sensible defaults for tests: fixed secret, no bootstrap admin.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            jwt_secret: jwt_secret.to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            refresh_grace_secs: DEFAULT_REFRESH_GRACE_SECS,
            bootstrap_admin: None,
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
