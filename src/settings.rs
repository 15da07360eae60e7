//! Process configuration, layered file + environment + defaults (a
//! library embedded in a long-running daemon benefits from
//! override-without-redeploy that a file alone doesn't give you).

use serde::Deserialize;

/// Configuration surface for a [`crate::query::QueryDriver`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Allowed interface name prefixes; empty means unrestricted.
    pub interface_prefixes: Vec<String>,

    /// Default address family filter for queries that don't specify
    /// one explicitly.
    pub default_family: DefaultFamily,

    /// Default overall query deadline, in milliseconds.
    pub default_timeout_ms: u64,
}

/// A serializable mirror of [`crate::query::FamilyFilter`]; kept
/// separate so the wire-facing `Family` enum in `cache` doesn't need
/// to grow a serde dependency just for configuration loading.
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DefaultFamily {
    Inet,
    Inet6,
    Any,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            interface_prefixes: Vec::new(),
            default_family: DefaultFamily::Any,
            default_timeout_ms: 5000,
        }
    }
}

impl Settings {
    /// Load settings from an optional YAML file, overlaid with
    /// `MDNS_*`-prefixed environment variables, falling back to
    /// [`Settings::default`] when neither is present.
    pub fn load(filename: Option<&str>) -> Result<Settings, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(filename) = filename {
            builder = builder.add_source(config::File::with_name(filename).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("MDNS").separator("_"));

        let defaults = Settings::default();
        builder = builder
            .set_default("interface_prefixes", defaults.interface_prefixes)?
            .set_default("default_family", "any")?
            .set_default("default_timeout_ms", defaults.default_timeout_ms)?;

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_unrestricted() {
        let settings = Settings::default();
        assert!(settings.interface_prefixes.is_empty());
        assert_eq!(settings.default_family, DefaultFamily::Any);
        assert_eq!(settings.default_timeout_ms, 5000);
    }
}
