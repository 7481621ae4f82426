use serde::{Deserialize, Serialize};
use vidfusion_av::EngineConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset, e.g. `"debug"` or
    /// `"vidfusion=info,vidfusion_av=debug"`
    #[serde(default)]
    pub level: Option<String>,
}

impl LoggingConfig {
    /// Filter directive for the subscriber. A bare level applies to both
    /// vidfusion crates.
    pub fn filter(&self) -> Option<String> {
        let level = self.level.as_deref()?.trim();
        if level.is_empty() {
            return None;
        }
        if level.contains('=') || level.contains(',') {
            Some(level.to_string())
        } else {
            Some(format!("vidfusion={level},vidfusion_av={level}"))
        }
    }
}
