//! Configuration management
//!
//! Configuration is read once at startup, in this order of precedence:
//! 1. Environment variables
//! 2. `smsbridge.toml` in the working directory
//! 3. Built-in defaults
//!
//! `${VAR_NAME}` inside the TOML file is expanded from the environment.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::{parse_route_map, RoutingEntry};
use crate::Error;

/// How chat-originated messages reach the SMS side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Push directly to the SMS gateway
    #[default]
    Push,
    /// Queue for an external poller
    Pull,
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull" | "poll" => Ok(Self::Pull),
            other => Err(Error::Config(format!("unknown delivery mode '{}'", other))),
        }
    }
}

/// Routing and authorization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Originating numbers allowed to inject messages
    pub allowed_numbers: Vec<String>,

    /// Routing table, in configuration order
    pub routes: Vec<RoutingEntry>,

    /// Raw destination IDs accepted as routing tokens besides the routed ones
    pub known_destination_ids: Vec<String>,

    /// Number used for chat -> SMS when nothing else resolves
    pub target_number: Option<String>,

    /// Token/body separator; whitespace when unset
    pub delimiter: Option<char>,

    pub delivery_mode: DeliveryMode,

    /// Wait for the delivered chat message id before answering the webhook
    pub confirm_delivery: bool,

    pub confirm_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_numbers: Vec::new(),
            routes: Vec::new(),
            known_destination_ids: Vec::new(),
            target_number: None,
            delimiter: None,
            delivery_mode: DeliveryMode::default(),
            confirm_delivery: false,
            confirm_timeout_secs: default_confirm_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

/// Reply-correlation memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Records older than this are ignored and pruned
    pub ttl_secs: u64,

    /// Inserting beyond this evicts the oldest record
    pub max_entries: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            max_entries: 1024,
        }
    }
}

/// SMS gateway client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Full URL of the gateway's send endpoint
    pub base_url: Option<String>,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Sending device / project identifier, if the gateway needs one
    pub phone_id: Option<String>,

    pub max_attempts: u32,

    pub retry_delay_secs: u64,

    pub timeout_secs: u64,

    /// Keep retrying after a 4xx response
    pub retry_client_errors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: String::new(),
            password: String::new(),
            phone_id: None,
            max_attempts: 3,
            retry_delay_secs: 5,
            timeout_secs: 30,
            retry_client_errors: true,
        }
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,

    /// Reject non-JSON webhook bodies with 415
    pub require_json: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            require_json: false,
        }
    }
}

fn default_api_port() -> u16 {
    5000
}

fn default_confirm_timeout_secs() -> u64 {
    10
}

/// Main configuration for smsbridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Discord bot token
    #[serde(skip_serializing)]
    pub discord_token: Option<String>,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&Self::expand_env_vars(&toml_content))?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> crate::Result<Self> {
        let toml: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Config {
            discord_token: toml.discord.and_then(|d| d.token),
            bridge: toml.bridge.unwrap_or_default(),
            context: toml.context.unwrap_or_default(),
            gateway: toml.gateway.unwrap_or_default(),
            api: toml.api.unwrap_or_default(),
        })
    }

    /// Load `./smsbridge.toml` if it exists, otherwise the environment alone.
    pub fn load() -> crate::Result<Self> {
        if Path::new("smsbridge.toml").exists() {
            return Self::from_toml_file("smsbridge.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> crate::Result<()> {
        if let Some(token) = env_string("DISCORD_BOT_TOKEN") {
            self.discord_token = Some(token);
        }

        // Bridge
        if let Some(numbers) = env_list("ALLOWED_NUMBERS") {
            self.bridge.allowed_numbers = numbers;
        }
        if let Some(map) = env_string("NUMBER_MAP") {
            self.bridge.routes = parse_route_map(&map)?;
        }
        if let Some(ids) = env_list("KNOWN_DESTINATION_IDS") {
            self.bridge.known_destination_ids = ids;
        }
        if let Some(number) = env_string("TARGET_PHONE_NUMBER") {
            self.bridge.target_number = Some(number);
        }
        if let Some(delimiter) = env_string("ROUTE_DELIMITER") {
            self.bridge.delimiter = delimiter.chars().next();
        }
        if let Some(mode) = env_string("DELIVERY_MODE") {
            self.bridge.delivery_mode = mode.parse()?;
        }
        if let Some(confirm) = env_bool("CONFIRM_DELIVERY")? {
            self.bridge.confirm_delivery = confirm;
        }
        if let Some(secs) = env_parse("CONFIRM_TIMEOUT_SECS") {
            self.bridge.confirm_timeout_secs = secs;
        }

        // Context
        if let Some(ttl) = env_parse("CONTEXT_TTL_SECS") {
            self.context.ttl_secs = ttl;
        }
        if let Some(max) = env_parse("CONTEXT_MAX_ENTRIES") {
            self.context.max_entries = max;
        }

        // Gateway
        if let Some(url) = env_string("SMS_GATEWAY_URL") {
            self.gateway.base_url = Some(url);
        }
        if let Some(username) = env_string("SMS_GATEWAY_USERNAME") {
            self.gateway.username = username;
        }
        if let Some(password) = env_string("SMS_GATEWAY_PASSWORD") {
            self.gateway.password = password;
        }
        if let Some(phone_id) = env_string("SMS_PHONE_ID") {
            self.gateway.phone_id = Some(phone_id);
        }
        if let Some(attempts) = env_parse("SMS_MAX_ATTEMPTS") {
            self.gateway.max_attempts = attempts;
        }
        if let Some(delay) = env_parse("SMS_RETRY_DELAY_SECS") {
            self.gateway.retry_delay_secs = delay;
        }
        if let Some(timeout) = env_parse("SMS_TIMEOUT_SECS") {
            self.gateway.timeout_secs = timeout;
        }
        if let Some(retry) = env_bool("SMS_RETRY_CLIENT_ERRORS")? {
            self.gateway.retry_client_errors = retry;
        }

        // API
        if let Some(port) = env_parse("API_PORT") {
            self.api.port = port;
        }
        if let Some(require_json) = env_bool("REQUIRE_JSON")? {
            self.api.require_json = require_json;
        }

        Ok(())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.bridge.routes {
            if entry.token.trim().is_empty() {
                return Err(Error::Config("routing token must not be empty".to_string()));
            }
            if !seen.insert(entry.normalized_token()) {
                return Err(Error::Config(format!(
                    "duplicate routing token '{}'",
                    entry.token
                )));
            }
        }

        if self.gateway.max_attempts == 0 {
            return Err(Error::Config("gateway max_attempts must be at least 1".to_string()));
        }

        if self.bridge.delivery_mode == DeliveryMode::Push && self.gateway.base_url.is_none() {
            return Err(Error::Config(
                "push delivery requires SMS_GATEWAY_URL / [gateway] base_url".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_string(name).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.trim().parse().ok())
}

fn env_bool(name: &str) -> crate::Result<Option<bool>> {
    env_string(name).map(|v| parse_bool(name, &v)).transpose()
}

fn parse_bool(name: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got '{}'", name, other))),
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    discord: Option<TomlDiscordConfig>,
    bridge: Option<BridgeConfig>,
    context: Option<ContextConfig>,
    gateway: Option<GatewayConfig>,
    api: Option<ApiConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDiscordConfig {
    token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DestinationKind;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.port, 5000);
        assert!(!config.api.require_json);
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.gateway.retry_delay_secs, 5);
        assert_eq!(config.gateway.timeout_secs, 30);
        assert!(config.gateway.retry_client_errors);
        assert_eq!(config.bridge.delivery_mode, DeliveryMode::Push);
        assert_eq!(config.context.max_entries, 1024);
    }

    #[test]
    fn test_delivery_mode_from_str() {
        assert_eq!("PULL".parse::<DeliveryMode>().unwrap(), DeliveryMode::Pull);
        assert_eq!(" push ".parse::<DeliveryMode>().unwrap(), DeliveryMode::Push);
        assert!("carrier-pigeon".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        for value in ["true", "1", "YES", " on "] {
            assert!(parse_bool("FLAG", value).unwrap());
        }
        for value in ["false", "0", "No", "off", "OFF"] {
            assert!(!parse_bool("FLAG", value).unwrap());
        }
        assert!(matches!(parse_bool("FLAG", "maybe"), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_bool_rejects_unknown_value() {
        unsafe {
            std::env::set_var("SMSBRIDGE_TEST_BOOL_OFF", "off");
            std::env::set_var("SMSBRIDGE_TEST_BOOL_BAD", "sometimes");
        }

        assert_eq!(env_bool("SMSBRIDGE_TEST_BOOL_OFF").unwrap(), Some(false));
        assert!(env_bool("SMSBRIDGE_TEST_BOOL_BAD").is_err());
        assert_eq!(env_bool("SMSBRIDGE_TEST_BOOL_UNSET").unwrap(), None);

        unsafe {
            std::env::remove_var("SMSBRIDGE_TEST_BOOL_OFF");
            std::env::remove_var("SMSBRIDGE_TEST_BOOL_BAD");
        }
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("SMSBRIDGE_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${SMSBRIDGE_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${SMSBRIDGE_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("SMSBRIDGE_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("cost: $5"), "cost: $5");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[discord]
token = "discord_token"

[bridge]
allowed_numbers = ["+15550001111", "+15550002222"]
target_number = "+15559990000"
delimiter = ":"
delivery_mode = "pull"
confirm_delivery = true

[[bridge.routes]]
token = "nova"
id = "111111111111111111"
number = "+15550001111"

[[bridge.routes]]
token = "abdu"
kind = "user"
id = "222222222222222222"

[context]
ttl_secs = 600

[gateway]
base_url = "https://sms.example.com/api/send"
username = "user"
password = "secret"
max_attempts = 5

[api]
port = 8080
require_json = true
"#;

        let config = Config::from_toml_str(toml_content).unwrap();
        assert_eq!(config.discord_token.as_deref(), Some("discord_token"));
        assert_eq!(config.bridge.allowed_numbers.len(), 2);
        assert_eq!(config.bridge.delimiter, Some(':'));
        assert_eq!(config.bridge.delivery_mode, DeliveryMode::Pull);
        assert!(config.bridge.confirm_delivery);
        assert_eq!(config.bridge.confirm_timeout_secs, 10);

        assert_eq!(config.bridge.routes.len(), 2);
        assert_eq!(config.bridge.routes[0].token, "nova");
        assert_eq!(config.bridge.routes[0].kind, DestinationKind::Channel);
        assert_eq!(config.bridge.routes[1].kind, DestinationKind::User);

        assert_eq!(config.context.ttl_secs, 600);
        assert_eq!(config.context.max_entries, 1024);
        assert_eq!(config.gateway.max_attempts, 5);
        assert_eq!(config.gateway.retry_delay_secs, 5);
        assert_eq!(config.api.port, 8080);
        assert!(config.api.require_json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_tokens() {
        let mut config = Config::default();
        config.bridge.delivery_mode = DeliveryMode::Pull;
        config.bridge.routes = parse_route_map(r#"[
            {"token": "Nova", "id": "1"},
            {"token": "nova", "id": "2"}
        ]"#)
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate routing token"));
    }

    #[test]
    fn test_validate_push_requires_gateway_url() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.base_url = Some("http://localhost:9000/send".to_string());
        assert!(config.validate().is_ok());
    }
}
