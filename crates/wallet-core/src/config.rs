//! Configuration types for the signer

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Network};

/// Characters reserved in every QR chunk for the protocol tag and page header
pub const CHUNK_HEADER_RESERVE: usize = 20;

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node URL (e.g., "http://127.0.0.1:9053")
    pub url: String,

    /// API key for authenticated endpoints (optional)
    #[serde(default)]
    pub api_key: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9053".to_string(),
            api_key: String::new(),
        }
    }
}

/// QR chunk size presets.
///
/// `standard_chunk_size` gives fewer, denser codes; `low_res_chunk_size` gives
/// more codes that scan reliably on poor cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    #[serde(default = "default_standard_chunk_size")]
    pub standard_chunk_size: usize,

    #[serde(default = "default_low_res_chunk_size")]
    pub low_res_chunk_size: usize,
}

fn default_standard_chunk_size() -> usize {
    2900
}

fn default_low_res_chunk_size() -> usize {
    1000
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            standard_chunk_size: default_standard_chunk_size(),
            low_res_chunk_size: default_low_res_chunk_size(),
        }
    }
}

/// ErgoPay fetch/reply settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErgoPayConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "ergo-signer".to_string()
}

impl Default for ErgoPayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Babel fee box search limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BabelFeeConfig {
    /// Boxes requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Pages scanned for a better price once a usable box exists
    #[serde(default = "default_max_price_pages")]
    pub max_price_pages: u32,

    /// Hard page limit per token, match or not
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Babel contract ErgoTree hex with `{tokenId}` in place of the token id
    #[serde(default)]
    pub contract_template: Option<String>,
}

fn default_page_size() -> u64 {
    50
}

fn default_max_price_pages() -> u32 {
    5
}

fn default_max_pages() -> u32 {
    20
}

impl Default for BabelFeeConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_price_pages: default_max_price_pages(),
            max_pages: default_max_pages(),
            contract_template: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node connection settings
    #[serde(default)]
    pub node: NodeConfig,

    /// Network (mainnet or testnet)
    #[serde(default = "default_network")]
    pub network: Network,

    #[serde(default)]
    pub qr: QrConfig,

    #[serde(default)]
    pub ergopay: ErgoPayConfig,

    #[serde(default)]
    pub babel_fee: BabelFeeConfig,
}

fn default_network() -> Network {
    Network::Mainnet
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            network: default_network(),
            qr: QrConfig::default(),
            ergopay: ErgoPayConfig::default(),
            babel_fee: BabelFeeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: AppConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let qr = &self.qr;
        if qr.low_res_chunk_size <= CHUNK_HEADER_RESERVE {
            return Err(Error::Config(format!(
                "qr.low_res_chunk_size must exceed {} characters",
                CHUNK_HEADER_RESERVE
            )));
        }
        if qr.low_res_chunk_size > qr.standard_chunk_size {
            return Err(Error::Config(
                "qr.low_res_chunk_size must not exceed qr.standard_chunk_size".to_string(),
            ));
        }
        if self.babel_fee.page_size == 0 || self.babel_fee.max_pages == 0 {
            return Err(Error::Config(
                "babel_fee.page_size and babel_fee.max_pages must be positive".to_string(),
            ));
        }
        if let Some(template) = &self.babel_fee.contract_template {
            if !template.contains("{tokenId}") {
                return Err(Error::Config(
                    "babel_fee.contract_template must contain {tokenId}".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.node.url, "http://127.0.0.1:9053");
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.qr.standard_chunk_size, 2900);
        assert_eq!(config.qr.low_res_chunk_size, 1000);
        assert_eq!(config.babel_fee.max_price_pages, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node.url, config.node.url);
        assert_eq!(parsed.ergopay.user_agent, "ergo-signer");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            network = "testnet"

            [node]
            url = "http://10.0.0.2:9052"

            [qr]
            low_res_chunk_size = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.node.url, "http://10.0.0.2:9052");
        assert_eq!(config.node.api_key, "");
        assert_eq!(config.qr.low_res_chunk_size, 600);
        assert_eq!(config.qr.standard_chunk_size, 2900);
        assert_eq!(config.ergopay.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_presets_rejected() {
        let err = AppConfig::from_toml_str("[qr]\nlow_res_chunk_size = 10\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = AppConfig::from_toml_str(
            "[qr]\nstandard_chunk_size = 500\nlow_res_chunk_size = 800\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_contract_template_needs_placeholder() {
        let err =
            AppConfig::from_toml_str("[babel_fee]\ncontract_template = \"100604\"\n").unwrap_err();
        assert!(err.to_string().contains("{tokenId}"));
    }
}
