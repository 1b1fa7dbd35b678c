use config::{Config, ConfigError, Environment, File};
use httpmeter_core::settings::metrics::MetricsSettings;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct Settings {
    pub bind_address: String,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Settings {
    pub fn get_environment() -> Environment {
        Environment::default()
            .prefix("HTTPMETER")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("metrics.skip_paths")
            .try_parsing(true)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("HTTPMETER_RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("metrics.service_name", env!("CARGO_PKG_NAME"))?
            .set_default("metrics.service_version", env!("CARGO_PKG_VERSION"))?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::get_environment());

        builder.build()?.try_deserialize()
    }
}
