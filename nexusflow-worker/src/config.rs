/// Worker configuration
///
/// | Variable                     | Default                  |                          |
/// |------------------------------|--------------------------|--------------------------|
/// | `DATABASE_URL`               | required                 |                          |
/// | `DATABASE_MAX_CONNECTIONS`   | 5                        |                          |
/// | `MAILER`                     | `log`                    | `log` or `http`          |
/// | `MAIL_RELAY_URL`             | required for `http`      |                          |
/// | `MAIL_RELAY_TOKEN`           | unset                    | sent as a bearer token   |
/// | `MAIL_FROM`                  | `NexusFlow <no-reply@nexusflow.local>` |            |
/// | `WORKER_POLL_INTERVAL_SECS`  | 5                        |                          |
/// | `WORKER_MAX_CONCURRENT`      | 4                        | deliveries in flight     |
/// | `WORKER_BATCH_SIZE`          | 10                       |                          |
/// | `WORKER_MAX_ATTEMPTS`        | 5                        | before an email fails    |
/// | `WORKER_SWEEP_INTERVAL_SECS` | 60                       |                          |
/// | `WORKER_STALE_AFTER_SECS`    | 300                      | `sending` rows requeued  |

use anyhow::{bail, Context};
use std::{env, str::FromStr, time::Duration};

use crate::orchestrator::OrchestratorConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailerKind {
    /// Writes each email to the log
    Log,

    /// POSTs each email to a relay
    Http { url: String, token: Option<String> },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub mailer: MailerKind,
    pub mail_from: String,
    pub orchestrator: OrchestratorConfig,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let mailer = match lookup("MAILER").unwrap_or_default().trim().to_lowercase().as_str() {
            "" | "log" => MailerKind::Log,
            "http" => MailerKind::Http {
                url: lookup("MAIL_RELAY_URL")
                    .filter(|u| !u.trim().is_empty())
                    .context("MAIL_RELAY_URL is required when MAILER=http")?,
                token: lookup("MAIL_RELAY_TOKEN").filter(|t| !t.is_empty()),
            },
            other => bail!("MAILER must be `log` or `http`, got {:?}", other),
        };

        let orchestrator = OrchestratorConfig {
            poll_interval: Duration::from_secs(parse_or(&lookup, "WORKER_POLL_INTERVAL_SECS", 5)?),
            max_concurrent: parse_or(&lookup, "WORKER_MAX_CONCURRENT", 4)?,
            batch_size: parse_or(&lookup, "WORKER_BATCH_SIZE", 10)?,
            max_attempts: parse_or(&lookup, "WORKER_MAX_ATTEMPTS", 5)?,
            sweep_interval: Duration::from_secs(parse_or(&lookup, "WORKER_SWEEP_INTERVAL_SECS", 60)?),
            stale_after: Duration::from_secs(parse_or(&lookup, "WORKER_STALE_AFTER_SECS", 300)?),
        };

        if orchestrator.max_concurrent == 0 || orchestrator.batch_size == 0 {
            bail!("WORKER_MAX_CONCURRENT and WORKER_BATCH_SIZE must be positive");
        }
        if orchestrator.max_attempts <= 0 {
            bail!("WORKER_MAX_ATTEMPTS must be positive");
        }

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            mailer,
            mail_from: lookup("MAIL_FROM")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| "NexusFlow <no-reply@nexusflow.local>".to_string()),
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<WorkerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgresql://localhost/nf")]).unwrap();

        assert_eq!(config.mailer, MailerKind::Log);
        assert_eq!(config.orchestrator.poll_interval, Duration::from_secs(5));
        assert_eq!(config.orchestrator.max_concurrent, 4);
        assert_eq!(config.orchestrator.max_attempts, 5);
        assert!(config.mail_from.contains("no-reply"));
    }

    #[test]
    fn test_http_mailer_needs_relay_url() {
        let err = load(&[("DATABASE_URL", "postgresql://localhost/nf"), ("MAILER", "http")]).unwrap_err();
        assert!(err.to_string().contains("MAIL_RELAY_URL"));

        let config = load(&[
            ("DATABASE_URL", "postgresql://localhost/nf"),
            ("MAILER", "HTTP"),
            ("MAIL_RELAY_URL", "https://relay.test/send"),
            ("MAIL_RELAY_TOKEN", "tok"),
        ])
        .unwrap();
        assert_eq!(
            config.mailer,
            MailerKind::Http {
                url: "https://relay.test/send".to_string(),
                token: Some("tok".to_string()),
            }
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("DATABASE_URL", "x"), ("MAILER", "smtp")]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("WORKER_MAX_CONCURRENT", "0")]).is_err());
        assert!(load(&[("DATABASE_URL", "x"), ("WORKER_BATCH_SIZE", "ten")]).is_err());
        assert!(load(&[]).is_err());
    }
}
