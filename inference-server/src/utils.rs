use {
    std::env::var,
    tracing::Level,
    tracing_subscriber::{
        prelude::*,
        filter::filter_fn,
    },
    config::{Config, ConfigError},
};

pub fn init_logging(json: bool) {
    let quiet_dependencies = filter_fn(|metadata| {
        if metadata.target().starts_with("hyper") {
            metadata.level() < &Level::INFO
        } else {
            true
        }
    });

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::INFO)
            .with_current_span(true)
            .finish()
            .with(quiet_dependencies)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .finish()
            .with(quiet_dependencies)
            .init();
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    let path = var("SERVING_CONFIG_PATH").unwrap_or("./config.toml".to_owned());
    load_config_from(&path)
}

pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("SERVING").separator("__"))
        .build()
}
