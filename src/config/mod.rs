mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};

/// Prefix of the environment variables read by `load_config`, e.g.
/// `TAGSUB__BROKER__MESSAGE_TTL_SECS=30`.
pub const ENV_PREFIX: &str = "TAGSUB";

/// Loads the configuration from `config/default` (any format the `config`
/// crate understands, optional) and `TAGSUB__*` environment variables, then
/// fills the gaps with `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}

#[cfg(test)]
mod tests;
