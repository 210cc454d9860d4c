//! Configuration module for environment variable parsing.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database location, as a `sqlite:///` URL or a bare path
    pub database_url: String,

    /// Shared secret for webhook signature verification.
    ///
    /// When unset the service never accepts a webhook and the readiness
    /// probe reports not ready.
    pub webhook_secret: Option<String>,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:////data/app.db".to_string()),

            webhook_secret: env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }

    /// Filesystem path of the SQLite database.
    ///
    /// Accepts `sqlite:///relative.db`, `sqlite:////absolute.db`, or a bare
    /// path. Anything without the URL prefix is returned verbatim.
    pub fn database_path(&self) -> &str {
        self.database_url
            .strip_prefix("sqlite:///")
            .unwrap_or(&self.database_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_from_url() {
        let config = Config {
            database_url: "sqlite:///local.db".to_string(),
            webhook_secret: None,
            port: 8080,
        };
        assert_eq!(config.database_path(), "local.db");

        let config = Config {
            database_url: "sqlite:////data/app.db".to_string(),
            webhook_secret: None,
            port: 8080,
        };
        assert_eq!(config.database_path(), "/data/app.db");

        let config = Config {
            database_url: "/var/lib/app.db".to_string(),
            webhook_secret: None,
            port: 8080,
        };
        assert_eq!(config.database_path(), "/var/lib/app.db");
    }

    // Env vars are process-global, so everything touching them lives in one
    // test to avoid interleaving with parallel test threads.
    #[test]
    fn test_from_env() {
        env::remove_var("DATABASE_URL");
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("PORT");

        let config = Config::from_env();
        assert_eq!(config.database_url, "sqlite:////data/app.db");
        assert!(config.webhook_secret.is_none());
        assert_eq!(config.port, 8080);

        env::set_var("DATABASE_URL", "sqlite:///test.db");
        env::set_var("WEBHOOK_SECRET", "s3cret");
        env::set_var("PORT", "9999");

        let config = Config::from_env();
        assert_eq!(config.database_path(), "test.db");
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.port, 9999);

        // Blank secret counts as unset
        env::set_var("WEBHOOK_SECRET", "   ");
        let config = Config::from_env();
        assert!(config.webhook_secret.is_none());

        env::remove_var("DATABASE_URL");
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("PORT");
    }
}
