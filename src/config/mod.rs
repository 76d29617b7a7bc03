mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings};

/// Prefix of environment overrides, e.g. `CHATSUB_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "CHATSUB";

/// Loads the configuration from `config/default.*`, a `.env` file and
/// `CHATSUB_`-prefixed environment variables, merged over default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
