use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod auth;
use keyward::{
    Config, Encrypted, FileBlobStore, KdfParams, Key, KeyStore, Password, Session, Storage,
    ValueKind, VaultError, default_storage, session::entries,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self, base: KdfParams) -> keyward::Result<KdfParams> {
        KdfParams::new(
            self.mem_cost_kib.unwrap_or(base.mem_cost_kib()),
            self.time_cost.unwrap_or(base.time_cost()),
            self.parallelism.unwrap_or(base.parallelism()),
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "keyward")]
#[command(
    version,
    about = "PIN and passphrase protected key vault with session lockout."
)]
struct Cli {
    /// Path to the vault file
    #[arg(long, global = true, value_name = "PATH", env = "KEYWARD_STORE")]
    store: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE", env = "KEYWARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new vault protected by PIN and passphrase
    Init {
        /// Also keep the passphrase so later unlocks need only the PIN
        #[arg(long)]
        cache_passphrase: bool,

        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Encrypts a value under the master key
    #[command(arg_required_else_help = true)]
    Encrypt { value: String },

    /// Decrypts an envelope produced by `encrypt`
    #[command(arg_required_else_help = true)]
    Decrypt { envelope: String },

    /// Prints the master key encrypted under PIN and passphrase
    ExportKey,

    /// Removes the cached passphrase
    ForgetPassphrase,

    /// Shows information about the vault
    Status,

    /// Deletes the vault and all of its keys
    Drop {
        /// Confirm that everything encrypted so far becomes unreadable
        #[arg(long)]
        yes: bool,
    },

    /// Generates a watermark key for obfuscation
    Watermark,

    /// Obfuscates a password for display
    #[command(arg_required_else_help = true)]
    Obfuscate {
        password: String,
        #[arg(long, env = "KEYWARD_WATERMARK")]
        watermark: String,
    },

    /// Reverses `obfuscate`
    #[command(arg_required_else_help = true)]
    Deobfuscate {
        password: String,
        #[arg(long, env = "KEYWARD_WATERMARK")]
        watermark: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    match &args.command {
        Commands::Watermark => {
            let watermark = keyward::generate_watermark_key()?;
            println!("{}", *watermark.to_base64());
            return Ok(());
        }
        Commands::Obfuscate {
            password,
            watermark,
        } => {
            let watermark = Key::from_base64(watermark).context("invalid watermark key")?;
            let shown = keyward::obfuscate(&Password::new(password), &watermark)?;
            println!("{}", *shown.expose());
            return Ok(());
        }
        Commands::Deobfuscate {
            password,
            watermark,
        } => {
            let watermark = Key::from_base64(watermark).context("invalid watermark key")?;
            let real = keyward::deobfuscate(&Password::new(password), &watermark)?;
            println!("{}", *real.expose());
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load(args.config.as_deref())?;
    let storage = resolve_storage(args.store.clone())?;
    let blobs = Arc::new(FileBlobStore::open(storage.clone())?);
    let keystore = open_keystore(&storage)?;

    if let Commands::Init { argon2, .. } = &args.command {
        config.kdf = argon2.to_kdf_params(config.kdf)?;
    }
    let session = Session::new(config, keystore, blobs.clone())?;

    match args.command {
        Commands::Init {
            cache_passphrase, ..
        } => {
            if session.vault_exists()? {
                bail!("keyward vault already exists");
            }
            let pin = auth::read_new_secret(auth::PIN_ENV, "PIN: ")?;
            let passphrase = auth::read_new_secret(auth::PASSPHRASE_ENV, "Passphrase: ")?;
            session.create_vault(&pin, &passphrase, cache_passphrase)?;
            println!("vault initialized");
        }
        Commands::Encrypt { value } => {
            unlock(&session)?;
            let envelope = session.encrypt_field(&value)?;
            println!("{envelope}");
        }
        Commands::Decrypt { envelope } => {
            let envelope: Encrypted = envelope.parse()?;
            unlock(&session)?;
            match envelope.kind() {
                ValueKind::Text => println!("{}", session.decrypt_field::<String>(&envelope)?),
                ValueKind::Password => {
                    let password = session.decrypt_field::<Password>(&envelope)?;
                    println!("{}", *password.expose());
                }
                ValueKind::Integer => println!("{}", session.decrypt_field::<i64>(&envelope)?),
                ValueKind::Key | ValueKind::Envelope => {
                    bail!("envelope holds key material and is not printed")
                }
            }
        }
        Commands::ExportKey => {
            unlock(&session)?;
            println!("{}", session.export_master_key()?);
        }
        Commands::ForgetPassphrase => {
            ensure_vault(&session)?;
            session.forget_cached_passphrase()?;
            println!("cached passphrase removed");
        }
        Commands::Status => {
            ensure_vault(&session)?;
            println!("Vault:             {}", storage.path().display());
            println!("Created:           {}", blobs.creation_date());
            if let Some(updated) = blobs.updated(entries::MASTER_KEY) {
                println!("Master key:        {updated}");
            }
            println!("Key store:         {KEYSTORE_NAME}");
            println!(
                "Cached passphrase: {}",
                if session.has_cached_passphrase()? { "yes" } else { "no" }
            );
            println!(
                "Max attempts:      {}",
                session.lockout().threshold()
            );
        }
        Commands::Drop { yes } => {
            if !yes {
                bail!("refusing to drop the vault without --yes");
            }
            session.drop_vault()?;
            keyward::key_storage_for(blobs.storage()).remove()?;
            println!("vault dropped");
        }
        Commands::Watermark | Commands::Obfuscate { .. } | Commands::Deobfuscate { .. } => {}
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean for envelopes and keys.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("KEYWARD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("keyward=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage(),
    }
}

#[cfg(feature = "os-keyring")]
const KEYSTORE_NAME: &str = "OS keyring";
#[cfg(not(feature = "os-keyring"))]
const KEYSTORE_NAME: &str = "software";

#[cfg(feature = "os-keyring")]
fn open_keystore(_storage: &Storage) -> Result<Arc<dyn KeyStore>> {
    Ok(Arc::new(keyward::OsKeyStore::new("keyward")))
}

#[cfg(not(feature = "os-keyring"))]
fn open_keystore(storage: &Storage) -> Result<Arc<dyn KeyStore>> {
    let keys = keyward::key_storage_for(storage);
    Ok(Arc::new(keyward::SoftwareKeyStore::open_file(keys)?))
}

fn ensure_vault(session: &Session) -> Result<()> {
    if !session.vault_exists()? {
        bail!("keyward vault does not exist");
    }
    Ok(())
}

/// Logs in, prompting again after a wrong PIN or passphrase when a
/// terminal is attached.
fn unlock(session: &Session) -> Result<()> {
    ensure_vault(session)?;
    loop {
        let pin = auth::read_secret(auth::PIN_ENV, "PIN: ")?;
        let passphrase = auth::from_env(auth::PASSPHRASE_ENV);

        let result = match session.login(&pin, passphrase.as_ref()) {
            Err(VaultError::PassphraseRequired) => {
                let passphrase = auth::read_secret(auth::PASSPHRASE_ENV, "Passphrase: ")?;
                session.login(&pin, Some(&passphrase))
            }
            other => other,
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && auth::is_interactive() => eprintln!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }
}
