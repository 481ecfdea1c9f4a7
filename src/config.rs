use chrono::Duration;
use clap::Args;

/// Longest session lifetime that may be configured or issued.
pub const MAX_SESSION_DAYS: i64 = 3650;

/// HTTP server settings. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "CREATOR_LEDGER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CREATOR_LEDGER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Lifetime of issued login sessions, in days
    #[arg(
        long,
        env = "CREATOR_LEDGER_SESSION_DAYS",
        default_value_t = 30,
        value_parser = clap::value_parser!(i64).range(1..=MAX_SESSION_DAYS)
    )]
    pub session_days: i64,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::days(self.session_days.clamp(1, MAX_SESSION_DAYS))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            session_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 3000,
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_session_lifetime_is_at_least_a_day() {
        let config = ServerConfig {
            session_days: 0,
            ..Default::default()
        };
        assert_eq!(config.session_lifetime(), Duration::days(1));

        let config = ServerConfig {
            session_days: i64::MAX,
            ..Default::default()
        };
        assert_eq!(config.session_lifetime(), Duration::days(MAX_SESSION_DAYS));
    }

    #[derive(clap::Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ServerConfig,
    }

    #[test]
    fn test_session_days_flag_is_bounded() {
        use clap::Parser;

        let cli = TestCli::try_parse_from(["test", "--session-days", "7"]).unwrap();
        assert_eq!(cli.config.session_days, 7);

        assert!(TestCli::try_parse_from(["test", "--session-days", "0"]).is_err());
        assert!(TestCli::try_parse_from(["test", "--session-days", "100000"]).is_err());
        assert!(
            TestCli::try_parse_from(["test", "--session-days", "9223372036854775807"]).is_err()
        );
    }
}
