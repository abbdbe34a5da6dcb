//! Per-deployment engine configuration, passed explicitly into the session,
//! gateway, and pipeline.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{GaeError, Result};

/// Field naming used when writing request bodies.
///
/// Engine deployments disagree on `batch_size` vs `batchSize`; responses are
/// always read tolerantly, so this only affects what the client sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireNaming {
    #[default]
    Snake,
    Camel,
}

impl WireNaming {
    /// Render a snake_case envelope key in this naming.
    pub fn key<'a>(&self, snake: &'a str) -> Cow<'a, str> {
        match self {
            WireNaming::Snake => Cow::Borrowed(snake),
            WireNaming::Camel => {
                if !snake.contains('_') {
                    return Cow::Borrowed(snake);
                }
                let mut out = String::with_capacity(snake.len());
                let mut upper = false;
                for c in snake.chars() {
                    if c == '_' {
                        upper = !out.is_empty();
                    } else if upper {
                        out.extend(c.to_uppercase());
                        upper = false;
                    } else {
                        out.push(c);
                    }
                }
                Cow::Owned(out)
            }
        }
    }
}

impl FromStr for WireNaming {
    type Err = GaeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snake" | "snake_case" => Ok(WireNaming::Snake),
            "camel" | "camelcase" | "camel_case" => Ok(WireNaming::Camel),
            other => Err(GaeError::Config(format!("unknown wire naming '{other}'"))),
        }
    }
}

/// Connection and polling settings for one engine deployment.
#[derive(Clone)]
pub struct EngineConfig {
    /// Base URL of the engine, e.g. `https://host:8829/graph-analytics/engines/abc`.
    pub engine_url: String,
    /// Absolute URL of the identity endpoint, e.g. `https://host:8529/_open/auth`.
    pub auth_url: String,
    pub username: String,
    pub password: String,
    /// Delay between status checks of a running job.
    pub poll_interval: Duration,
    /// When set, the delay grows exponentially up to this cap.
    pub poll_interval_max: Option<Duration>,
    /// Per-job wait bound. `None` waits until the job finishes.
    pub job_deadline: Option<Duration>,
    pub wire_naming: WireNaming,
}

impl EngineConfig {
    pub fn new(
        engine_url: impl Into<String>,
        auth_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            engine_url: engine_url.into(),
            auth_url: auth_url.into(),
            username: username.into(),
            password: password.into(),
            poll_interval: Duration::from_millis(500),
            poll_interval_max: None,
            job_deadline: None,
            wire_naming: WireNaming::Snake,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_interval_max(mut self, max: Duration) -> Self {
        self.poll_interval_max = Some(max);
        self
    }

    pub fn with_job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = Some(deadline);
        self
    }

    pub fn with_wire_naming(mut self, naming: WireNaming) -> Self {
        self.wire_naming = naming;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("engine_url", &self.engine_url), ("auth_url", &self.auth_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GaeError::Config(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.username.is_empty() {
            return Err(GaeError::Config("username must not be empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(GaeError::Config("poll interval must be positive".into()));
        }
        if let Some(max) = self.poll_interval_max {
            if max < self.poll_interval {
                return Err(GaeError::Config(
                    "maximum poll interval is below the poll interval".into(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("engine_url", &self.engine_url)
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("poll_interval", &self.poll_interval)
            .field("poll_interval_max", &self.poll_interval_max)
            .field("job_deadline", &self.job_deadline)
            .field("wire_naming", &self.wire_naming)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::new(
            "http://engine:8829/graph-analytics/engines/e1/",
            "http://db:8529/_open/auth",
            "root",
            "pw",
        )
    }

    #[test]
    fn camel_keys() {
        let n = WireNaming::Camel;
        assert_eq!(n.key("batch_size"), "batchSize");
        assert_eq!(n.key("vertex_collections"), "vertexCollections");
        assert_eq!(n.key("job_ids"), "jobIds");
        assert_eq!(n.key("database"), "database");
    }

    #[test]
    fn snake_keys_pass_through() {
        assert_eq!(WireNaming::Snake.key("graph_id"), "graph_id");
    }

    #[test]
    fn wire_naming_from_str() {
        assert_eq!("camel".parse::<WireNaming>().unwrap(), WireNaming::Camel);
        assert_eq!("SNAKE".parse::<WireNaming>().unwrap(), WireNaming::Snake);
        assert!("kebab".parse::<WireNaming>().is_err());
    }

    #[test]
    fn validate_checks_urls_and_intervals() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.engine_url = "engine:8829".into();
        assert!(bad.validate().is_err());

        let bad = config().with_poll_interval(Duration::ZERO);
        assert!(bad.validate().is_err());

        let bad = config()
            .with_poll_interval(Duration::from_secs(2))
            .with_poll_interval_max(Duration::from_secs(1));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let dbg = format!("{:?}", config());
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("\"pw\""));
    }
}
