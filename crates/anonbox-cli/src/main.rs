//! anonbox: sender-anonymous envelope encryption CLI
//!
//! Commands:
//!   keygen [--out-dir <dir>]          - generate an X25519 key pair
//!   pubkey                            - derive the public key of a private key
//!   encrypt                           - seal a message to a recipient public key
//!   decrypt [<envelope>]              - open an envelope with a private key
//!   validate [<envelope>]             - structural check of an envelope
//!   check-key <key> --kind <kind>     - report whether a key is usable
//!   format-key [<key>] -e <encoding>  - normalize a raw/hex/base64 key to base64
//!   config show                       - display current configuration
//!
//! Envelopes are read from a file argument or stdin, as JSON or `0x` hex armor.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use anonbox_core::config::{
    check_file_mode, expand_tilde, AnonboxConfig, Armor, LogFormat, DEFAULT_CONFIG_PATH,
};
use anonbox_crypto::{
    codec::{hex_dearmor, HEX_ARMOR_PREFIX},
    decrypt,
    derive_public_key,
    encrypt,
    format_key,
    generate_key_pair,
    is_valid_key,
    validate_envelope_format,
    EncryptedEnvelope,
    KeyEncoding,
    KeyInput,
    KeyKind,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "anonbox",
    version,
    about = "Sender-anonymous public-key encryption",
    long_about = "anonbox: seal messages to an X25519 public key with single-use sender keys \
                  (x25519-xsalsa20-poly1305 envelopes)"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "ANONBOX_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "ANONBOX_LOG")]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long, env = "ANONBOX_LOG_FORMAT")]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new X25519 key pair
    ///
    /// Without --out-dir the pair is printed as JSON: {"privateKey", "publicKey"}.
    Keygen {
        /// Write private.key (mode 600) and public.key into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Derive the public key belonging to a private key
    Pubkey {
        #[command(flatten)]
        key: PrivateKeyArgs,
    },

    /// Seal a message to a recipient public key
    Encrypt {
        /// Recipient public key (base64)
        #[arg(long, conflicts_with = "to_file")]
        to: Option<String>,
        /// File holding the recipient public key (default: keys.public_key_file)
        #[arg(long)]
        to_file: Option<PathBuf>,
        /// Message text (default: read --input, else stdin)
        #[arg(long, short = 'm', conflicts_with = "input")]
        message: Option<String>,
        /// File holding the message
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
        /// Envelope output form (overrides config)
        #[arg(long)]
        armor: Option<ArmorArg>,
        /// Write the envelope here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Open an envelope with a private key
    Decrypt {
        #[command(flatten)]
        key: PrivateKeyArgs,
        /// Envelope file, JSON or 0x hex armor (default: stdin)
        envelope: Option<PathBuf>,
        /// Write the plaintext here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Check that an envelope has every required field as a non-empty string
    Validate {
        /// Envelope file, JSON or 0x hex armor (default: stdin)
        envelope: Option<PathBuf>,
    },

    /// Report whether a base64 key is usable (exit code 1 if not)
    #[command(name = "check-key")]
    CheckKey {
        key: String,
        /// "public" or "private"
        #[arg(long, short = 'k', default_value = "public")]
        kind: String,
    },

    /// Convert a key to canonical base64
    #[command(name = "format-key")]
    FormatKey {
        /// Key text (hex or base64); omit to read --input
        key: Option<String>,
        /// Input encoding: "raw", "hex" or "base64"
        #[arg(long, short = 'e', default_value = "raw")]
        encoding: String,
        /// File holding the key (raw bytes for --encoding raw)
        #[arg(long, short = 'i', conflicts_with = "key")]
        input: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct PrivateKeyArgs {
    /// Private key (base64)
    #[arg(long, conflicts_with = "key_file")]
    key: Option<String>,
    /// File holding the private key (default: keys.private_key_file)
    #[arg(long)]
    key_file: Option<PathBuf>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Clone, Debug, ValueEnum)]
enum ArmorArg {
    Json,
    Hex,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (config, found) = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(LogFormatArg::Json) => LogFormat::Json,
        Some(LogFormatArg::Text) => LogFormat::Text,
        None => config.log.format,
    };
    init_logging(&level, format);

    if !found {
        debug!("config file not found: {}  (using defaults)", config_path.display());
    } else if config.config_file_mode_check {
        check_file_mode(&config_path)
            .with_context(|| format!("checking mode of {}", config_path.display()))?;
    }

    match cli.command {
        Commands::Keygen { out_dir } => cmd_keygen(out_dir.as_deref()).await,
        Commands::Pubkey { key } => cmd_pubkey(&config, &key).await,
        Commands::Encrypt {
            to,
            to_file,
            message,
            input,
            armor,
            output,
        } => {
            let recipient = resolve_public_key(&config, to, to_file.as_deref()).await?;
            let message = match message {
                Some(m) => Zeroizing::new(m),
                None => read_input(input.as_deref()).await?,
            };
            let armor = match armor {
                Some(ArmorArg::Json) => Armor::Json,
                Some(ArmorArg::Hex) => Armor::Hex,
                None => config.output.armor,
            };
            cmd_encrypt(&config, &recipient, &message, armor, output.as_deref()).await
        }
        Commands::Decrypt {
            key,
            envelope,
            output,
        } => {
            cmd_decrypt(&config, &key, envelope.as_deref(), output.as_deref()).await
        }
        Commands::Validate { envelope } => cmd_validate(envelope.as_deref()).await,
        Commands::CheckKey { key, kind } => {
            if !cmd_check_key(&key, &kind)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::FormatKey {
            key,
            encoding,
            input,
        } => {
            cmd_format_key(key.as_deref(), &encoding, input.as_deref()).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

// ── Config loading and logging ────────────────────────────────────────────────

/// Returns the parsed config and whether the file existed.
async fn load_config(path: &Path) -> Result<(AnonboxConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = AnonboxConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AnonboxConfig::default(), false))
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Input / output helpers ────────────────────────────────────────────────────

/// Read a file, or stdin when no path is given.
async fn read_input(path: Option<&Path>) -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    match path {
        Some(p) => {
            let mut file = tokio::fs::File::open(p)
                .await
                .with_context(|| format!("opening {}", p.display()))?;
            file.read_to_string(&mut buf)
                .await
                .with_context(|| format!("reading {}", p.display()))?;
        }
        None => {
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading stdin")?;
        }
    }
    Ok(buf)
}

/// Read a one-line key file, trimming surrounding whitespace.
async fn read_key_file(path: &Path) -> Result<Zeroizing<String>> {
    let content = Zeroizing::new(
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading key file: {}", path.display()))?,
    );
    Ok(Zeroizing::new(content.trim().to_string()))
}

/// Write to a file, or stdout when no path is given.
async fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            tokio::fs::write(p, content)
                .await
                .with_context(|| format!("writing {}", p.display()))?;
            info!("wrote {}", p.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(content.as_bytes()).await.context("writing stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
    }
    Ok(())
}

/// Private key precedence: --key > --key-file > keys.private_key_file
async fn resolve_private_key(
    config: &AnonboxConfig,
    args: &PrivateKeyArgs,
) -> Result<Zeroizing<String>> {
    if let Some(key) = &args.key {
        return Ok(Zeroizing::new(key.trim().to_string()));
    }
    let path = args
        .key_file
        .clone()
        .or_else(|| config.private_key_file())
        .context("no private key: pass --key or --key-file, or set keys.private_key_file")?;
    read_key_file(&path).await
}

/// Recipient precedence: --to > --to-file > keys.public_key_file
async fn resolve_public_key(
    config: &AnonboxConfig,
    to: Option<String>,
    to_file: Option<&Path>,
) -> Result<String> {
    if let Some(key) = to {
        return Ok(key.trim().to_string());
    }
    let path = to_file
        .map(Path::to_path_buf)
        .or_else(|| config.public_key_file())
        .context("no recipient: pass --to or --to-file, or set keys.public_key_file")?;
    Ok(read_key_file(&path).await?.to_string())
}

fn render_envelope(envelope: &EncryptedEnvelope, armor: Armor, pretty: bool) -> Result<String> {
    let text = match (armor, pretty) {
        (Armor::Hex, _) => envelope.to_hex_armor()?,
        (Armor::Json, true) => envelope.to_json_pretty()?,
        (Armor::Json, false) => envelope.to_json()?,
    };
    Ok(format!("{text}\n"))
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_keygen(out_dir: Option<&Path>) -> Result<()> {
    let pair = generate_key_pair()?;

    let Some(dir) = out_dir else {
        let json = Zeroizing::new(serde_json::to_string_pretty(&pair.to_json())?);
        return write_output(None, &format!("{}\n", json.as_str())).await;
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let private_path = dir.join("private.key");
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(&private_path)
        .await
        .with_context(|| format!("creating {} (refusing to overwrite)", private_path.display()))?;
    file.write_all(format!("{}\n", pair.private_key().expose_secret()).as_bytes())
        .await
        .with_context(|| format!("writing {}", private_path.display()))?;
    file.flush().await?;

    let public_path = dir.join("public.key");
    tokio::fs::write(&public_path, format!("{}\n", pair.public_key()))
        .await
        .with_context(|| format!("writing {}", public_path.display()))?;

    info!(dir = %dir.display(), "generated key pair");
    println!("private key: {}", private_path.display());
    println!("public key:  {}", public_path.display());
    println!("{}", pair.public_key());
    Ok(())
}

async fn cmd_pubkey(config: &AnonboxConfig, args: &PrivateKeyArgs) -> Result<()> {
    let private = resolve_private_key(config, args).await?;
    let public = derive_public_key(&private)?;
    println!("{public}");
    Ok(())
}

async fn cmd_encrypt(
    config: &AnonboxConfig,
    recipient: &str,
    message: &str,
    armor: Armor,
    output: Option<&Path>,
) -> Result<()> {
    let envelope = encrypt(recipient, message)?;
    debug!(armor = ?armor, "encrypted {} bytes", message.len());
    let rendered = render_envelope(&envelope, armor, config.output.pretty)?;
    write_output(output, &rendered).await
}

async fn cmd_decrypt(
    config: &AnonboxConfig,
    args: &PrivateKeyArgs,
    envelope_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let private = resolve_private_key(config, args).await?;
    let text = read_input(envelope_path).await?;
    let envelope = EncryptedEnvelope::parse(&text)?;
    let plaintext = Zeroizing::new(decrypt(&private, &envelope)?);
    write_output(output, &plaintext).await
}

async fn cmd_validate(envelope_path: Option<&Path>) -> Result<()> {
    let text = read_input(envelope_path).await?;
    let value = envelope_value(&text)?;
    validate_envelope_format(&value)?;

    let version = value["version"].as_str().unwrap_or_default();
    if version != anonbox_crypto::VERSION {
        warn!("envelope version {version:?} is not supported by this build");
    }
    println!("envelope OK (version {version})");
    Ok(())
}

/// Parse envelope text (JSON or hex armor) into an untyped JSON value.
fn envelope_value(text: &str) -> Result<serde_json::Value> {
    let json = if text.trim_start().starts_with(HEX_ARMOR_PREFIX) {
        hex_dearmor(text)?
    } else {
        text.to_string()
    };
    serde_json::from_str(&json).context("envelope is not valid JSON")
}

fn cmd_check_key(key: &str, kind: &str) -> Result<bool> {
    let kind: KeyKind = kind.parse()?;
    let valid = is_valid_key(key.trim(), kind);
    println!("{}", if valid { "valid" } else { "invalid" });
    Ok(valid)
}

async fn cmd_format_key(key: Option<&str>, encoding: &str, input: Option<&Path>) -> Result<()> {
    let encoding: KeyEncoding = encoding.parse()?;

    let formatted = match (encoding, key, input) {
        (KeyEncoding::Raw, Some(text), None) => format_key(KeyInput::Raw(text.as_bytes()))?,
        (KeyEncoding::Raw, None, Some(path)) => {
            let bytes = Zeroizing::new(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
            );
            format_key(KeyInput::Raw(&bytes))?
        }
        (encoding, Some(text), None) => format_key(text_input(encoding, text.trim()))?,
        (encoding, None, Some(path)) => {
            let text = read_key_file(path).await?;
            format_key(text_input(encoding, &text))?
        }
        (_, None, None) => anyhow::bail!("format-key: pass a key or --input <file>"),
        (_, Some(_), Some(_)) => {
            anyhow::bail!("format-key: pass either a key or --input, not both")
        }
    };

    println!("{formatted}");
    Ok(())
}

fn text_input(encoding: KeyEncoding, text: &str) -> KeyInput<'_> {
    match encoding {
        KeyEncoding::Raw => KeyInput::Raw(text.as_bytes()),
        KeyEncoding::Hex => KeyInput::Hex(text),
        KeyEncoding::Base64 => KeyInput::Base64(text),
    }
}

fn cmd_config_show(config: &AnonboxConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}
