use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,

    // Score repair job; 0 (the default) disables it
    pub score_repair_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Self::from_lookup(|key| env::var(key))
    }

    /// Build from any key lookup shaped like [`env::var`].
    pub fn from_lookup(
        var: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: var("DATABASE_URL")?,
            jwt_secret: var("JWT_SECRET")?,
            host: var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            allowed_origins: var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(20),
            score_repair_interval_secs: var("SCORE_REPAIR_INTERVAL_SECS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
        })
    }
}
