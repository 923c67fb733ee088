use ::config::shared::AppConfig;
use ::config::{LoadConfigError, load_config};

/// Loads and validates the application configuration.
///
/// Running without a `configuration` directory is allowed and yields the default
/// configuration, environment overrides are only read when the directory exists.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let app_config = match load_config::<AppConfig>() {
        Ok(app_config) => app_config,
        Err(LoadConfigError::MissingConfigurationDirectory(_)) => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };

    app_config.validate()?;

    Ok(app_config)
}
