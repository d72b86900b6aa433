//! Startup configuration resolved from the environment.

use std::env;

/// Bind address, upstream credentials, and request limits for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_base_url: String,
}

impl ProxyConfig {
    /// Resolve configuration from the process environment, loading a local
    /// `.env` file first if present.
    ///
    /// # Errors
    ///
    /// Returns the exact fatal-startup message mandated for a missing
    /// database URL.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("ARCHESTRA_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .map_err(|_| {
                "Database URL is not set. Please set ARCHESTRA_DATABASE_URL or DATABASE_URL"
                    .to_string()
            })?;

        Ok(Self {
            bind_addr: env::var("ARCHESTRA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("ARCHESTRA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_url,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".into()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_has_exact_message() {
        // SAFETY: test runs single-threaded per process in this module.
        unsafe {
            env::remove_var("ARCHESTRA_DATABASE_URL");
            env::remove_var("DATABASE_URL");
        }
        let err = ProxyConfig::from_env().unwrap_err();
        assert_eq!(
            err,
            "Database URL is not set. Please set ARCHESTRA_DATABASE_URL or DATABASE_URL"
        );
    }
}
