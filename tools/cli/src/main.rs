//! Pearanoid CLI - Command line interface for the password vault.
//!
//! One-shot commands unlock the vault, do their work and lock it again.
//! `pearanoid shell` keeps a session open until it is closed or the idle
//! timer locks it.

mod shell;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use pearanoid_common::EntryId;
use pearanoid_crypto::{generate_password, PasswordPolicy};
use pearanoid_storage::create_default_registry;
use pearanoid_vault::{ClientConfig, CredentialEntry, EntryFields, EntryUpdate, VaultSession};

/// Configuration file name under the user's config directory.
const CONFIG_FILENAME: &str = "config.json";

#[derive(Parser)]
#[command(name = "pearanoid")]
#[command(about = "Pearanoid - Encrypted password vault")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct GlobalArgs {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config dir>/pearanoid/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage provider: "local", "http" or "memory".
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Directory holding the local vault file.
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Base URL of a remote vault server.
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault.
    Init,

    #[command(flatten)]
    Vault(VaultCommand),

    /// Generate a random password.
    Generate(GenerateArgs),

    /// Start an interactive session.
    Shell,
}

/// Commands that need an unlocked vault.
#[derive(Subcommand, Debug)]
pub(crate) enum VaultCommand {
    /// List entries.
    List(ListArgs),

    /// Show one entry.
    Show(ShowArgs),

    /// Add an entry.
    Add(AddArgs),

    /// Change fields of an entry.
    Update(UpdateArgs),

    /// Remove an entry.
    Remove {
        /// Entry id.
        id: String,
    },

    /// List sections in use.
    Sections,
}

#[derive(Args, Debug)]
pub(crate) struct ListArgs {
    /// Only entries in this section.
    #[arg(short, long)]
    section: Option<String>,

    /// Only entries whose text fields contain this.
    #[arg(short = 'q', long)]
    search: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ShowArgs {
    /// Entry id.
    id: String,

    /// Print the password in clear.
    #[arg(short, long)]
    reveal: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AddArgs {
    /// Entry name.
    #[arg(short, long)]
    name: String,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    email: Option<String>,

    #[arg(short, long)]
    section: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Generate the password instead of prompting for it.
    #[arg(short, long)]
    generate: bool,

    /// Length of a generated password.
    #[arg(short, long, default_value_t = 16, requires = "generate")]
    length: usize,
}

#[derive(Args, Debug)]
pub(crate) struct UpdateArgs {
    /// Entry id.
    id: String,

    #[arg(short, long)]
    name: Option<String>,

    /// New username; an empty value clears it.
    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    email: Option<String>,

    #[arg(short, long)]
    section: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Prompt for a new password.
    #[arg(short, long, conflicts_with = "generate")]
    password: bool,

    /// Replace the password with a generated one.
    #[arg(short, long)]
    generate: bool,

    /// Length of a generated password.
    #[arg(short, long, default_value_t = 16, requires = "generate")]
    length: usize,
}

#[derive(Args, Debug)]
pub(crate) struct GenerateArgs {
    /// Password length.
    #[arg(short, long, default_value_t = 16)]
    length: usize,

    #[arg(long)]
    no_upper: bool,

    #[arg(long)]
    no_lower: bool,

    #[arg(long)]
    no_digits: bool,

    #[arg(long)]
    no_symbols: bool,
}

impl GenerateArgs {
    fn policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            length: self.length,
            uppercase: !self.no_upper,
            lowercase: !self.no_lower,
            digits: !self.no_digits,
            symbols: !self.no_symbols,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let builder = FmtSubscriber::builder().with_target(false).compact();
    if cli.global.verbose {
        tracing::subscriber::set_global_default(builder.with_max_level(Level::DEBUG).finish())?;
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())?;
    }

    match cli.command {
        Commands::Init => cmd_init(&cli.global).await,
        Commands::Vault(command) => cmd_vault(&cli.global, command).await,
        Commands::Generate(args) => cmd_generate(&args),
        Commands::Shell => shell::run(&cli.global).await,
    }
}

fn config_path(global: &GlobalArgs) -> Option<PathBuf> {
    global.config.clone().or_else(|| {
        dirs::config_dir().map(|dir| dir.join("pearanoid").join(CONFIG_FILENAME))
    })
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("pearanoid"))
        .context("Could not determine a data directory; pass --path")
}

/// Load the config file if there is one, then apply command line overrides.
fn load_config(global: &GlobalArgs) -> Result<ClientConfig> {
    let mut config = match config_path(global) {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading config");
            ClientConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        Some(path) if global.config.is_some() => {
            bail!("Config file not found: {}", path.display())
        }
        _ => match &global.path {
            Some(path) => ClientConfig::local(path),
            None => ClientConfig::local(default_data_dir()?),
        },
    };

    if let Some(path) = &global.path {
        config.provider_type = "local".to_string();
        config.provider_config = serde_json::json!({ "root": path.to_string_lossy() });
    }
    if let Some(url) = &global.url {
        config.provider_type = "http".to_string();
        config.provider_config = serde_json::json!({ "base_url": url });
    }
    if let Some(provider) = &global.provider {
        config.provider_type = provider.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Build a session for the configured provider and check storage.
pub(crate) async fn open_session(global: &GlobalArgs) -> Result<(VaultSession, ClientConfig)> {
    let config = load_config(global)?;

    let registry = create_default_registry();
    let provider = registry
        .resolve(&config.provider_type, config.provider_config.clone())
        .with_context(|| format!("Failed to open {} storage", config.provider_type))?;

    let session = VaultSession::new(provider, config.session.clone())
        .context("Invalid session configuration")?;
    session
        .initialize()
        .await
        .context("Failed to reach vault storage")?;

    info!(provider = %config.provider_type, exists = session.vault_exists(), "Storage ready");
    Ok((session, config))
}

/// Prompt for a secret without echo.
fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(secret))
}

/// Prompt twice for a new master password.
fn prompt_new_master_password() -> Result<Zeroizing<String>> {
    let password = prompt_secret("New master password: ")?;
    let confirm = prompt_secret("Confirm master password: ")?;

    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

/// Unlock, creating the vault when storage has none.
pub(crate) async fn unlock(session: &VaultSession) -> Result<()> {
    let password = if session.vault_exists() {
        prompt_secret("Master password: ")?
    } else {
        println!("No vault found. A new one will be created.");
        prompt_new_master_password()?
    };

    session
        .unlock(password.as_bytes())
        .await
        .context("Failed to unlock vault")
}

async fn cmd_init(global: &GlobalArgs) -> Result<()> {
    let (session, config) = open_session(global).await?;
    if session.vault_exists() {
        bail!(
            "A vault already exists in {} storage",
            config.provider_type
        );
    }

    let password = prompt_new_master_password()?;
    session
        .unlock(password.as_bytes())
        .await
        .context("Failed to create vault")?;
    session.lock().await;

    println!("Vault created successfully!");
    println!("  Provider: {}", config.provider_type);

    if let Some(path) = config_path(global) {
        if !path.exists() {
            config
                .save(&path)
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("  Config: {}", path.display());
        }
    }

    Ok(())
}

async fn cmd_vault(global: &GlobalArgs, command: VaultCommand) -> Result<()> {
    let (session, _) = open_session(global).await?;
    if !session.vault_exists() {
        bail!("No vault found. Run `pearanoid init` first");
    }
    unlock(&session).await?;

    let result = execute(&session, command).await;
    session.lock().await;
    result
}

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    let password = generate_password(&args.policy())?;
    println!("{}", password.as_str());
    Ok(())
}

fn parse_id(id: &str) -> Result<EntryId> {
    EntryId::new(id).with_context(|| format!("Invalid entry id '{}'", id))
}

async fn existing_entry(session: &VaultSession, id: &EntryId) -> Result<CredentialEntry> {
    session
        .entry(id)
        .await
        .with_context(|| format!("No entry with id {}", id))
}

fn generated(length: usize) -> Result<Zeroizing<String>> {
    let policy = PasswordPolicy {
        length,
        ..PasswordPolicy::default()
    };
    Ok(generate_password(&policy)?)
}

/// Run one vault command against an unlocked session.
pub(crate) async fn execute(session: &VaultSession, command: VaultCommand) -> Result<()> {
    match command {
        VaultCommand::List(args) => {
            let entries = match &args.search {
                Some(query) => session.search(query).await,
                None => session.entries().await,
            }
            .context("Vault is locked")?;

            let entries: Vec<_> = entries
                .into_iter()
                .filter(|e| match &args.section {
                    Some(section) => e.section() == Some(section.as_str()),
                    None => true,
                })
                .collect();

            if entries.is_empty() {
                println!("No entries.");
            } else {
                print_table(&entries);
            }
        }

        VaultCommand::Show(args) => {
            let id = parse_id(&args.id)?;
            let entry = existing_entry(session, &id).await?;
            print_entry(&entry, args.reveal);
        }

        VaultCommand::Add(args) => {
            let password = if args.generate {
                generated(args.length)?
            } else {
                prompt_secret("Entry password (empty for none): ")?
            };

            let mut fields = EntryFields::new(args.name, password.as_str());
            fields.username = args.username;
            fields.email = args.email;
            fields.section = args.section;
            fields.notes = args.notes;

            let id = session
                .add_entry(fields)
                .await
                .context("Failed to save entry")?
                .context("Vault is locked")?;

            println!("Entry added: {}", id);
            if args.generate {
                println!("Password generated; use `show {} --reveal` to view it.", id);
            }
        }

        VaultCommand::Update(args) => {
            let id = parse_id(&args.id)?;
            existing_entry(session, &id).await?;

            let mut update = EntryUpdate::new();
            update.name = args.name;
            update.username = args.username;
            update.email = args.email;
            update.section = args.section;
            update.notes = args.notes;
            if args.generate {
                update.password = Some(generated(args.length)?.to_string());
            } else if args.password {
                update.password = Some(prompt_secret("New entry password: ")?.to_string());
            }

            if update.is_empty() {
                bail!("Nothing to update");
            }

            session
                .update_entry(&id, update)
                .await
                .context("Failed to save entry")?;
            println!("Entry updated: {}", id);
        }

        VaultCommand::Remove { id } => {
            let id = parse_id(&id)?;
            let entry = existing_entry(session, &id).await?;

            session
                .delete_entry(&id)
                .await
                .context("Failed to save vault")?;
            println!("Entry removed: {} ({})", entry.name(), id);
        }

        VaultCommand::Sections => {
            let sections = session.sections();
            if sections.is_empty() {
                println!("No sections.");
            }
            for section in sections {
                println!("  {}", section);
            }
        }
    }

    Ok(())
}

fn print_table(entries: &[CredentialEntry]) {
    println!(
        "{:<36}  {:<24}  {:<24}  {}",
        "ID", "NAME", "USERNAME", "SECTION"
    );
    for entry in entries {
        println!(
            "{:<36}  {:<24}  {:<24}  {}",
            entry.id(),
            entry.name(),
            entry.username().unwrap_or("-"),
            entry.section().unwrap_or("-"),
        );
    }
}

fn print_entry(entry: &CredentialEntry, reveal: bool) {
    println!("{}", entry.name());
    println!("  ID:       {}", entry.id());
    if let Some(username) = entry.username() {
        println!("  Username: {}", username);
    }
    if let Some(email) = entry.email() {
        println!("  Email:    {}", email);
    }
    if reveal {
        println!("  Password: {}", entry.password());
    } else {
        println!("  Password: ********");
    }
    if let Some(section) = entry.section() {
        println!("  Section:  {}", section);
    }
    if let Some(notes) = entry.notes() {
        println!("  Notes:    {}", notes);
    }
    println!("  Created:  {}", entry.created_at());
    println!("  Updated:  {}", entry.updated_at());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "pearanoid", "add", "--name", "Bank", "--section", "Finance", "--generate",
            "--length", "24",
        ])
        .unwrap();

        match cli.command {
            Commands::Vault(VaultCommand::Add(args)) => {
                assert_eq!(args.name, "Bank");
                assert_eq!(args.section.as_deref(), Some("Finance"));
                assert!(args.generate);
                assert_eq!(args.length, 24);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_length_requires_generate() {
        assert!(Cli::try_parse_from(["pearanoid", "add", "--name", "x", "--length", "8"]).is_err());
    }

    #[test]
    fn test_global_flags_after_command() {
        let cli =
            Cli::try_parse_from(["pearanoid", "list", "--provider", "memory", "-v"]).unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.provider.as_deref(), Some("memory"));
    }

    #[test]
    fn test_url_override() {
        let global = GlobalArgs {
            verbose: false,
            config: None,
            provider: None,
            path: Some(PathBuf::from("/tmp/ignored")),
            url: Some("https://vault.example.com".to_string()),
        };
        let config = load_config(&global).unwrap();

        assert_eq!(config.provider_type, "http");
        assert_eq!(config.provider_config["base_url"], "https://vault.example.com");
    }

    #[test]
    fn test_missing_explicit_config() {
        let global = GlobalArgs {
            verbose: false,
            config: Some(PathBuf::from("/nonexistent/pearanoid.json")),
            provider: None,
            path: None,
            url: None,
        };
        assert!(load_config(&global).is_err());
    }

    #[test]
    fn test_generate_policy() {
        let args = GenerateArgs {
            length: 20,
            no_upper: true,
            no_lower: false,
            no_digits: false,
            no_symbols: true,
        };
        let policy = args.policy();
        assert_eq!(policy.length, 20);
        assert!(!policy.uppercase);
        assert!(!policy.symbols);
        assert!(policy.lowercase && policy.digits);
    }

    #[test]
    fn test_oversized_length_is_an_error() {
        let cli = Cli::try_parse_from([
            "pearanoid",
            "generate",
            "--length",
            "18446744073709551615",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate(args) => assert!(cmd_generate(&args).is_err()),
            _ => panic!("expected generate"),
        }
        assert!(generated(usize::MAX).is_err());
    }
}
