//! CLI command definitions and argument parsing

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use agentwire_core::relay::{ForwardRelay, RelayOutcome};
use agentwire_core::{EnvelopeConfig, EnvelopeKeys, EnvelopeService, WalletCapability, WireMessage};
use agentwire_crypto::{KeyPair, Wallet};

use crate::keyfile::{load_wallet, KeyFile};
use crate::ExitCode;

/// agentwire - pack, unpack and relay agent message envelopes
#[derive(Parser, Debug)]
#[command(name = "agentwire")]
#[command(version, about = "Pack, unpack and relay agent message envelopes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (written to stderr)
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Envelope config file (TOML); falls back to AGENTWIRE_* environment variables
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a key pair and write it to a key file
    Keygen(KeygenArgs),
    /// Encrypt a message, wrapping it once per routing key
    Pack(PackArgs),
    /// Decrypt one envelope layer
    Unpack(UnpackArgs),
    /// Act as a mediator for one envelope
    Relay(RelayArgs),
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Key file to create
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct PackArgs {
    /// JSON message file ("-" for stdin)
    #[arg(long)]
    pub message: PathBuf,

    /// Recipient verkey (repeatable)
    #[arg(long = "to", required = true)]
    pub recipients: Vec<String>,

    /// Mediator verkey, innermost first (repeatable)
    #[arg(long = "route")]
    pub routes: Vec<String>,

    /// Sender key file; omit for an anonymous envelope
    #[arg(long)]
    pub sender: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct UnpackArgs {
    /// Local key file (repeatable)
    #[arg(long = "key", required = true)]
    pub keys: Vec<PathBuf>,

    /// Wire message file ("-" for stdin)
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RelayArgs {
    /// Mediator key file (repeatable)
    #[arg(long = "key", required = true)]
    pub keys: Vec<PathBuf>,

    /// Wire message file ("-" for stdin)
    #[arg(long)]
    pub input: PathBuf,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Commands::Keygen(args) => args.execute(),
            Commands::Pack(args) => args.execute(load_config(self.config.as_deref())?).await,
            Commands::Unpack(args) => args.execute(load_config(self.config.as_deref())?).await,
            Commands::Relay(args) => args.execute(load_config(self.config.as_deref())?).await,
        }
    }
}

/// Envelope config from `path`, or from `AGENTWIRE_*` variables when no file is given.
fn load_config(path: Option<&Path>) -> anyhow::Result<EnvelopeConfig> {
    match path {
        Some(path) => Ok(EnvelopeConfig::load_from_file(path)?),
        None => {
            let config = EnvelopeConfig::load_from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

impl KeygenArgs {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let pair = KeyPair::generate();
        KeyFile::from_pair(&pair).save(&self.out)?;
        info!(verkey = %pair.verkey(), path = %self.out.display(), "generated key");
        println!("{}", pair.verkey());
        Ok(ExitCode::Success)
    }
}

impl PackArgs {
    pub async fn execute(self, config: EnvelopeConfig) -> anyhow::Result<ExitCode> {
        let message: Value = serde_json::from_slice(&read_input(&self.message)?)
            .with_context(|| format!("{} is not JSON", self.message.display()))?;

        let (wallet, sender_key) = match &self.sender {
            Some(path) => {
                let (wallet, verkey) = sender_wallet(path)?;
                (wallet, Some(verkey))
            }
            None => (Wallet::new(), None),
        };

        let mut keys = EnvelopeKeys::new(self.recipients).with_routing_keys(self.routes);
        if let Some(sender_key) = sender_key {
            keys = keys.with_sender_key(sender_key);
        }

        let service = EnvelopeService::new(Arc::new(WalletCapability::new(wallet)), config);
        let wire = service.pack_message(&message, keys).await?;

        print_json(wire.as_json())?;
        Ok(ExitCode::Success)
    }
}

impl UnpackArgs {
    pub async fn execute(self, config: EnvelopeConfig) -> anyhow::Result<ExitCode> {
        let service = service_for(&self.keys, config)?;
        let wire = WireMessage::from_bytes(&read_input(&self.input)?)?;

        let context = service.unpack_message(&wire).await?;
        print_json(&serde_json::to_value(&context)?)?;
        Ok(ExitCode::Success)
    }
}

impl RelayArgs {
    pub async fn execute(self, config: EnvelopeConfig) -> anyhow::Result<ExitCode> {
        let relay = ForwardRelay::new(Arc::new(service_for(&self.keys, config)?));
        let bytes = read_input(&self.input)?;

        let output = match relay.process_bytes(&bytes).await? {
            RelayOutcome::Forward { to, message } => json!({
                "action": "forward",
                "to": to,
                "message": message,
            }),
            RelayOutcome::Deliver(context) => json!({
                "action": "deliver",
                "context": context,
            }),
        };
        print_json(&output)?;
        Ok(ExitCode::Success)
    }
}

/// Wallet holding only the sender key, plus that key's verkey.
fn sender_wallet(path: &Path) -> anyhow::Result<(Wallet, String)> {
    let file = KeyFile::load(path)?;
    let mut wallet = Wallet::new();
    let verkey = wallet.import_secret(&file.secret)?;
    Ok((wallet, verkey))
}

fn service_for(key_files: &[PathBuf], config: EnvelopeConfig) -> anyhow::Result<EnvelopeService> {
    let wallet = load_wallet(key_files)?;
    info!(keys = wallet.len(), "loaded wallet");
    Ok(EnvelopeService::new(
        Arc::new(WalletCapability::new(wallet)),
        config,
    ))
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
