//! ergo-signer: command-line front end for the signing workflows

pub mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use qr_transport::QrResolution;
use wallet_core::constants::TX_FEE_NANO;
use wallet_core::{AppConfig, Network};

#[derive(Parser)]
#[command(name = "ergo-signer")]
#[command(about = "Cold signing, ErgoPay and babel fee tools for Ergo wallets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured network
    #[arg(long, global = true, value_enum)]
    pub network: Option<NetworkArg>,

    /// Override the configured node URL
    #[arg(long, global = true)]
    pub node: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode a transaction file as QR chunks, one per line
    Chunk {
        /// Request (reduced tx) or response (signed tx)
        #[arg(short, long, value_enum, default_value_t = PayloadKind::Request)]
        kind: PayloadKind,

        #[arg(short, long, value_enum, default_value_t = ResolutionArg::Standard)]
        resolution: ResolutionArg,

        /// Sender address hint for requests
        #[arg(long)]
        sender: Option<String>,

        /// Sigma-serialized transaction, raw or hex
        input: PathBuf,
    },

    /// Read chunk lines from stdin and print the reassembled payload
    Collect,

    /// Sign a scanned cold signing request read from stdin.
    /// The mnemonic is taken from ERGO_SIGNER_MNEMONIC.
    Sign {
        /// Number of addresses (derivation indices 0..n) to sign with
        #[arg(short, long, default_value_t = 1)]
        addresses: u32,

        #[arg(short, long, value_enum, default_value_t = ResolutionArg::Standard)]
        resolution: ResolutionArg,
    },

    /// Fetch and describe an ErgoPay request
    Ergopay {
        /// `ergopay:` URI
        uri: String,

        /// Address substituted into the request URL
        #[arg(short, long)]
        address: Option<String>,

        /// Sign with ERGO_SIGNER_MNEMONIC and broadcast
        #[arg(long)]
        sign: bool,
    },

    /// Look for a babel box paying the fee with a token
    Babel {
        #[arg(long)]
        token: String,

        /// Raw token balance available
        #[arg(long)]
        balance: u64,

        #[arg(long, default_value_t = 0)]
        decimals: u8,

        /// Fee in nanoERG
        #[arg(long, default_value_t = TX_FEE_NANO)]
        fee: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkArg {
    Mainnet,
    Testnet,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    Request,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    Standard,
    LowRes,
}

impl From<ResolutionArg> for QrResolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Standard => QrResolution::Standard,
            ResolutionArg::LowRes => QrResolution::LowRes,
        }
    }
}

/// Log to stderr, `RUST_LOG` taking precedence over the defaults
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ergo_signer=debug,info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Configuration file (or defaults) with command-line overrides applied
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(network) = cli.network {
        config.network = network.into();
    }
    if let Some(url) = &cli.node {
        config.node.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    tracing::debug!(network = %config.network, node = %config.node.url, "Configuration loaded");

    match cli.command {
        Commands::Chunk {
            kind,
            resolution,
            sender,
            input,
        } => commands::chunk::run(&config, kind, resolution.into(), sender, &input),
        Commands::Collect => commands::collect::run(),
        Commands::Sign {
            addresses,
            resolution,
        } => commands::sign::run(&config, addresses, resolution.into()).await,
        Commands::Ergopay { uri, address, sign } => {
            commands::ergopay::run(&config, &uri, address, sign).await
        }
        Commands::Babel {
            token,
            balance,
            decimals,
            fee,
        } => commands::babel::run(&config, &token, balance, decimals, fee).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from([
            "ergo-signer",
            "--network",
            "testnet",
            "chunk",
            "--kind",
            "response",
            "-r",
            "low-res",
            "tx.bin",
        ]);
        assert_eq!(cli.network, Some(NetworkArg::Testnet));
        assert!(matches!(
            cli.command,
            Commands::Chunk {
                kind: PayloadKind::Response,
                resolution: ResolutionArg::LowRes,
                ..
            }
        ));

        let cli = Cli::parse_from(["ergo-signer", "babel", "--token", "aa", "--balance", "10"]);
        assert!(matches!(cli.command, Commands::Babel { fee: TX_FEE_NANO, .. }));
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "ergo-signer",
            "--node",
            "http://10.0.0.2:9053",
            "--network",
            "testnet",
            "collect",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.node.url, "http://10.0.0.2:9053");
    }
}
