//! # Configuration and settings
//!
//! This module is used to retrieve the configuration from the environment variables
//! and parse them into a struct.

use crate::state::role::Role;
use crate::transport::PushChannelConfig;
use dotenv::dotenv;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration settings for the notification client.
#[derive(Deserialize, Clone, Debug)]
pub struct Configuration {
    /// Base URL of the REST API, e.g. `http://localhost:8080/api`.
    pub api_base: String,
    /// WebSocket endpoint of the push channel, e.g. `ws://localhost:8080/ws`.
    pub ws_url: String,
    /// Bearer token of the session. When absent the token file is tried.
    pub access_token: Option<String>,
    /// Persisted session storage holding the token.
    pub token_file: Option<PathBuf>,
    /// Role of the authenticated user, e.g. `DRH`.
    pub role: Option<Role>,
    /// Rows per history page.
    #[serde(
        default = "default_page_size",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub page_size: u32,
    /// Fixed reconnect delay of the push channel, in seconds.
    #[serde(
        default = "default_reconnect_delay_secs",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub reconnect_delay_secs: u64,
    /// Heartbeat interval of the push channel, in seconds.
    #[serde(
        default = "default_heartbeat_secs",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub heartbeat_secs: u64,
}

impl Configuration {
    /// Push channel settings derived from this configuration.
    pub fn push_channel(&self) -> PushChannelConfig {
        PushChannelConfig {
            url: self.ws_url.clone(),
            token_file: self.token_file.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            heartbeat: Duration::from_secs(self.heartbeat_secs),
            ..Default::default()
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_heartbeat_secs() -> u64 {
    10
}

/// Returns a configuration object from the environment variables.
pub fn get_configuration() -> Result<Configuration, config::ConfigError> {
    dotenv().ok();

    let configuration = config::Config::builder()
        .add_source(config::Environment::default())
        .build()?;

    configuration.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_take_their_defaults() {
        let configuration: Configuration = serde_json::from_str(
            r#"{
                "api_base": "http://localhost:8080/api",
                "ws_url": "ws://localhost:8080/ws"
            }"#,
        )
        .unwrap();

        assert_eq!(configuration.page_size, 10);
        assert_eq!(configuration.reconnect_delay_secs, 5);
        assert_eq!(configuration.heartbeat_secs, 10);
        assert!(configuration.access_token.is_none());
        assert!(configuration.role.is_none());
    }

    #[test]
    fn numbers_parse_from_strings() {
        let configuration: Configuration = serde_json::from_str(
            r#"{
                "api_base": "http://localhost:8080/api",
                "ws_url": "ws://localhost:8080/ws",
                "role": "DRH",
                "page_size": "25",
                "reconnect_delay_secs": "2"
            }"#,
        )
        .unwrap();

        assert_eq!(configuration.page_size, 25);
        assert_eq!(configuration.role, Some(Role::Drh));
        let push = configuration.push_channel();
        assert_eq!(push.reconnect_delay, Duration::from_secs(2));
        assert_eq!(push.destination, "/user/queue/notifications");
    }
}
