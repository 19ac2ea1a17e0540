//! Environment-driven configuration. Command-line flags take precedence.

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite database file (default: "celery.db").
    pub database: String,

    /// Name of the user commands act as, if any.
    pub user: Option<String>,

    /// Currency code used when displaying amounts (default: "EUR").
    pub currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "celery.db".into(),
            user: None,
            currency: "EUR".into(),
        }
    }
}

impl Config {
    /// Load configuration from `CELERY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            database: non_empty("CELERY_DATABASE").unwrap_or(defaults.database),
            user: non_empty("CELERY_USER"),
            currency: non_empty("CELERY_CURRENCY")
                .map(|code| code.trim().to_uppercase())
                .unwrap_or(defaults.currency),
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, database: Option<String>, user: Option<String>) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if user.is_some() {
            self.user = user;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn test_reads_environment() {
        let config = Config::from_lookup(lookup(&[
            ("CELERY_DATABASE", "/tmp/split.db"),
            ("CELERY_USER", "alice"),
            ("CELERY_CURRENCY", "usd"),
        ]));

        assert_eq!(config.database, "/tmp/split.db");
        assert_eq!(config.user.as_deref(), Some("alice"));
        assert_eq!(config.currency, "USD");
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = Config::from_lookup(lookup(&[("CELERY_USER", "  ")]));
        assert_eq!(config.user, None);
    }

    #[test]
    fn test_flags_override_environment() {
        let config = Config::from_lookup(lookup(&[("CELERY_USER", "alice")]))
            .with_overrides(Some("other.db".into()), Some("bob".into()));

        assert_eq!(config.database, "other.db");
        assert_eq!(config.user.as_deref(), Some("bob"));

        let untouched = Config::default().with_overrides(None, None);
        assert_eq!(untouched, Config::default());
    }
}
