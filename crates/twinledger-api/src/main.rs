//! `twinledger`: run an Authority or Executor node, or act as a client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use twinledger_api::{
    AuthorityClient, ClientConfig, ExecutorClient, config, init_tracing, run_authority,
    run_executor,
};
use twinledger_auth::{Wallet, generate_signing_key, public_key_hex, signing_key_from_hex};
use twinledger_bridge::AutoBridge;
use twinledger_types::{
    AuthorityApi, AuthorityConfig, ExecutorApi, ExecutorConfig, ExecutorPayload, Result,
};

#[derive(Parser)]
#[command(name = "twinledger")]
#[command(about = "Two-ledger escrow and settlement", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "TWINLEDGER_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "TWINLEDGER_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an Authority node
    Authority {
        /// TOML config file
        #[arg(short, long, env = "TWINLEDGER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Run an Executor node
    Executor {
        /// TOML config file
        #[arg(short, long, env = "TWINLEDGER_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Generate an ed25519 keypair and print it with its address
    Keygen,
    /// Place a bet, bridging funds from the Authority first if needed
    Bet {
        /// TOML client config file
        #[arg(short, long, env = "TWINLEDGER_CONFIG")]
        config: Option<PathBuf>,
        /// Hex secret key of the bettor
        #[arg(long, env = "TWINLEDGER_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
        #[arg(long)]
        market: String,
        #[arg(long)]
        outcome: String,
        #[arg(long)]
        amount: Decimal,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json);

    match cli.command {
        Command::Authority { config: path } => {
            let cfg: AuthorityConfig = config::load(path.as_deref())?;
            run_authority(cfg).await
        }
        Command::Executor { config: path } => {
            let cfg: ExecutorConfig = config::load(path.as_deref())?;
            run_executor(cfg).await
        }
        Command::Keygen => {
            let key = generate_signing_key();
            let wallet = Wallet::new(key.clone());
            println!("secret_key = \"{}\"", hex::encode(key.to_bytes()));
            println!("public_key = \"{}\"", public_key_hex(&key));
            println!("address    = \"{}\"", wallet.address());
            Ok(())
        }
        Command::Bet {
            config: path,
            secret_key,
            market,
            outcome,
            amount,
        } => {
            let cfg: ClientConfig = config::load(path.as_deref())?;
            let timeout = Duration::from_millis(cfg.request_timeout_ms);
            let authority = AuthorityClient::new(&cfg.authority_url, timeout)?;
            let executor = ExecutorClient::new(&cfg.executor_url, timeout)?;
            let wallet = Wallet::new(signing_key_from_hex(&secret_key)?);
            let auto = AutoBridge::new(
                Arc::new(authority) as Arc<dyn AuthorityApi>,
                Arc::new(executor) as Arc<dyn ExecutorApi>,
                cfg.bridge,
            );
            let receipt = auto
                .execute(
                    &wallet,
                    &ExecutorPayload::Bet {
                        market_id: market,
                        outcome,
                        amount,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
    }
}
