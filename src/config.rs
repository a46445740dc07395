use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DISCORD_TOKEN is not set")]
    MissingToken,
}

pub struct Config {
    pub discord_token: String,
}

impl Config {
    /// Reads configuration from the environment, honouring a local `.env`
    /// file. Startup fails hard without a token.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let discord_token = env::var("DISCORD_TOKEN").map_err(|_| ConfigError::MissingToken)?;
        Ok(Self { discord_token })
    }
}
