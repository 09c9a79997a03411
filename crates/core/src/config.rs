use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DRIPFLOW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    /// Number of content steps in the campaign. Recipients past this day
    /// are finished and excluded from the due set.
    #[serde(default = "default_campaign_length")]
    pub length: u32,
    /// UTC hour of the daily send window.
    #[serde(default = "default_send_hour")]
    pub send_hour: u32,
    /// UTC minute of the daily send window.
    #[serde(default = "default_send_minute")]
    pub send_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_phone_number_id")]
    pub phone_number_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_campaign_length() -> u32 {
    15
}
fn default_send_hour() -> u32 {
    10
}
fn default_send_minute() -> u32 {
    0
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_api_base_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}
fn default_phone_number_id() -> String {
    "demo-phone".to_string()
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            length: default_campaign_length(),
            send_hour: default_send_hour(),
            send_minute: default_send_minute(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            phone_number_id: default_phone_number_id(),
            access_token: String::new(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            campaign: CampaignConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DRIPFLOW")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
