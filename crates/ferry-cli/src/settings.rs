//! Engine configuration from file and environment.
//!
//! Sources, later overriding earlier: built-in defaults, `ferry.{toml,json,yaml}`
//! in the working directory (or the file given with `--config`), then
//! `FERRY__*` environment variables (`FERRY__BASE_URL`,
//! `FERRY__RATE_LIMIT__DEFAULT__CEILING`, ...).

use anyhow::Context;
use config::{Config, Environment, File};
use ferry_migrate::EngineConfig;
use std::path::Path;

/// Environment source for `FERRY__*` variables.
pub fn environment() -> Environment {
    Environment::with_prefix("FERRY")
        .separator("__")
        .try_parsing(true)
}

/// Load configuration from `path` (or `./ferry.*` if present) and `env`.
pub fn load(path: Option<&Path>, env: Environment) -> anyhow::Result<EngineConfig> {
    let mut builder = Config::builder();

    builder = match path {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder.add_source(File::with_name("ferry").required(false)),
    };

    let config: EngineConfig = builder
        .add_source(env)
        .build()
        .context("failed to build configuration")?
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_migrate::ResourceKind;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
base_url = "https://file.example.com"
page_size = 50

[rate_limit.default]
ceiling = 2
window_ms = 1000

[system_ids]
voice = "vx-9"
"#
        )
        .unwrap();

        let config = load(
            Some(file.path()),
            env(&[("FERRY__BASE_URL", "https://env.example.com")]),
        )
        .unwrap();

        assert_eq!(config.base_url, "https://env.example.com");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.rate_limit.limit_for("createItem").ceiling, 2);
        assert_eq!(config.system_id(ResourceKind::Voice), "vx-9");
        assert_eq!(config.token_ttl_secs, 900);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load(Some(Path::new("/nonexistent/ferry.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = load(None, env(&[("FERRY__PAGE_SIZE", "0")]));
        assert!(result.is_err());
    }
}
