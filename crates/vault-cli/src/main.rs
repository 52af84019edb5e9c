use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vault_core::{
    CryptoProvider, EntryCategory, EntryPatch, FileStore, KeyValueStore, KeyringStore, MainVault, MemoryStore,
    Message, NewEntry, PersonalVault, Role, Storage, SystemCryptoProvider, VaultConfig,
};
use zeroize::Zeroizing;

mod paths;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local encrypted vault", long_about = None)]
struct Cli {
    /// Data directory; defaults to VAULT_DATA_DIR or the platform data dir
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Keep the personal-vault session in process memory instead of the OS keyring
    #[arg(long, global = true)]
    no_session: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether each compartment is initialized and unlocked
    Status,
    /// Main vault: persona, chat history and settings
    Main {
        #[command(subcommand)]
        command: MainCommand,
    },
    /// Personal vault: categorized sensitive entries
    Personal {
        #[command(subcommand)]
        command: PersonalCommand,
    },
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// Create the main vault
    Init,
    /// Print the decrypted contents as JSON
    Show,
    /// Replace the persona text
    Persona { text: String },
    /// Set a setting; the value is parsed as JSON, falling back to a string
    Set { key: String, value: String },
    /// Append a chat message
    Say {
        #[arg(long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
        content: String,
    },
    /// Change the main vault password
    Passwd,
    /// Delete the main vault. Irreversible
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PersonalCommand {
    /// Create the personal vault
    Init,
    /// Add an entry; the secret value is prompted for
    Add {
        #[arg(long)]
        category: EntryCategory,
        label: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List entries without their values
    List,
    /// Search label, category, notes and tags
    Search { query: String },
    /// Print one entry including its value
    Show { id: String },
    /// Edit an entry
    Update {
        id: String,
        #[arg(long)]
        category: Option<EntryCategory>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
        /// Replace all tags
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Prompt for a new secret value
        #[arg(long)]
        value: bool,
    },
    /// Delete an entry
    Delete { id: String },
    /// Lock now and forget the session
    Lock,
    /// Change the personal vault password
    Passwd,
    /// Delete the personal vault. Irreversible
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    User,
    Assistant,
    System,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
            RoleArg::System => Role::System,
        }
    }
}

struct AppContext {
    storage: Storage,
    crypto: Arc<dyn CryptoProvider>,
    config: VaultConfig,
}

impl AppContext {
    fn load(data_dir_override: Option<PathBuf>, no_session: bool) -> Result<Self> {
        let data = match data_dir_override {
            Some(dir) => dir,
            None => paths::data_dir()?,
        };
        std::fs::create_dir_all(&data).with_context(|| format!("create {}", data.display()))?;
        let config = VaultConfig::load(paths::config_path(&data))?;
        let durable: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(paths::store_path(&data)));
        let ephemeral: Arc<dyn KeyValueStore> = if no_session {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(KeyringStore::new(paths::SESSION_SERVICE))
        };
        debug!(data_dir = %data.display(), ?config, "context loaded");
        Ok(Self {
            storage: Storage::new(durable, ephemeral),
            crypto: Arc::new(SystemCryptoProvider),
            config,
        })
    }

    fn main_vault(&self) -> MainVault {
        MainVault::new(self.storage.clone(), self.crypto.clone(), self.config.clone())
    }

    async fn personal_vault(&self) -> PersonalVault {
        PersonalVault::open(self.storage.clone(), self.crypto.clone(), self.config.clone()).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let ctx = AppContext::load(cli.data_dir, cli.no_session)?;
    match cli.command {
        Commands::Status => status_command(&ctx).await,
        Commands::Main { command } => {
            let vault = ctx.main_vault();
            let result = main_command(&vault, command).await;
            // the main vault never outlives a single invocation
            vault.lock().await;
            result
        }
        Commands::Personal { command } => personal_command(&ctx, command).await,
    }
}

async fn status_command(ctx: &AppContext) -> Result<()> {
    let main = ctx.main_vault();
    let personal = ctx.personal_vault().await;
    println!("main:     {:?}", main.status().await?);
    println!("personal: {:?}", personal.status().await?);
    if let Some(remaining) = personal.auto_lock_remaining() {
        println!("personal auto-lock in {}s", remaining.as_secs());
    }
    Ok(())
}

async fn main_command(vault: &MainVault, command: MainCommand) -> Result<()> {
    match command {
        MainCommand::Init => {
            let password = prompt_password_twice("Create main vault password: ")?;
            vault.initialize(&password).await?;
            println!("Main vault created");
        }
        MainCommand::Show => {
            unlock_main(vault).await?;
            let data = vault.read().ok_or_else(|| anyhow!("vault locked"))?;
            println!("{}", serde_json::to_string_pretty(&*data)?);
        }
        MainCommand::Persona { text } => {
            unlock_main(vault).await?;
            vault.mutate(|data| data.persona = Some(text)).await?;
            println!("Persona updated");
        }
        MainCommand::Set { key, value } => {
            unlock_main(vault).await?;
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            vault.mutate(|data| data.settings.insert(key, value)).await?;
            println!("Setting saved");
        }
        MainCommand::Say { role, content } => {
            unlock_main(vault).await?;
            let message = Message::new(role.into(), content);
            let id = message.id.clone();
            vault.mutate(|data| data.chat_history.push(message)).await?;
            println!("{id}");
        }
        MainCommand::Passwd => {
            let current = prompt_password_once("Current main vault password: ")?;
            let new = prompt_new_password("New main vault password: ")?;
            vault.change_password(&current, &new).await?;
            println!("Main vault password changed");
        }
        MainCommand::Wipe { yes } => {
            if !yes {
                bail!("refusing to wipe without --yes");
            }
            vault.wipe().await?;
            println!("Main vault wiped");
        }
    }
    Ok(())
}

async fn unlock_main(vault: &MainVault) -> Result<()> {
    let password = prompt_password_once("Main vault password: ")?;
    vault.unlock(&password).await?;
    Ok(())
}

async fn personal_command(ctx: &AppContext, command: PersonalCommand) -> Result<()> {
    let vault = ctx.personal_vault().await;
    match command {
        PersonalCommand::Init => {
            let password = prompt_password_twice("Create personal vault password: ")?;
            vault.initialize(&password).await?;
            println!("Personal vault created");
        }
        PersonalCommand::Add {
            category,
            label,
            notes,
            tags,
        } => {
            unlock_personal(&vault).await?;
            let value = prompt_secret("Entry value: ")?;
            let mut entry = NewEntry::new(category, label, value.as_str()).with_tags(tags);
            if let Some(notes) = notes {
                entry = entry.with_notes(notes);
            }
            let added = vault.add_entry(entry).await?;
            println!("{}", added.id);
        }
        PersonalCommand::List => {
            unlock_personal(&vault).await?;
            for meta in vault.metadata()? {
                println!("{}  {:<9}  {}  [{}]", meta.id, meta.category, meta.label, meta.tags.join(", "));
            }
        }
        PersonalCommand::Search { query } => {
            unlock_personal(&vault).await?;
            for entry in vault.search(&query)? {
                let meta = entry.metadata();
                println!("{}  {:<9}  {}", meta.id, meta.category, meta.label);
            }
        }
        PersonalCommand::Show { id } => {
            unlock_personal(&vault).await?;
            let entry = vault.entry(&id)?.ok_or_else(|| anyhow!("no entry with id {id}"))?;
            println!("{} ({})", entry.label, entry.category);
            println!("value: {}", entry.value);
            if let Some(notes) = &entry.notes {
                println!("notes: {notes}");
            }
            if !entry.tags.is_empty() {
                println!("tags:  {}", entry.tags.join(", "));
            }
        }
        PersonalCommand::Update {
            id,
            category,
            label,
            notes,
            clear_notes,
            tags,
            value,
        } => {
            unlock_personal(&vault).await?;
            let value = if value {
                Some(prompt_secret("New entry value: ")?.as_str().to_owned())
            } else {
                None
            };
            let patch = EntryPatch {
                category,
                label,
                value,
                notes: if clear_notes { Some(None) } else { notes.map(Some) },
                tags: (!tags.is_empty()).then_some(tags),
            };
            if patch.is_empty() {
                bail!("nothing to update");
            }
            vault.update_entry(&id, patch).await?;
            println!("Entry updated");
        }
        PersonalCommand::Delete { id } => {
            unlock_personal(&vault).await?;
            if !vault.delete_entry(&id).await? {
                bail!("no entry with id {id}");
            }
            println!("Entry deleted");
        }
        PersonalCommand::Lock => {
            vault.lock().await?;
            println!("Personal vault locked");
        }
        PersonalCommand::Passwd => {
            let current = prompt_password_once("Current personal vault password: ")?;
            let new = prompt_new_password("New personal vault password: ")?;
            vault.change_password(&current, &new).await?;
            println!("Personal vault password changed");
        }
        PersonalCommand::Wipe { yes } => {
            if !yes {
                bail!("refusing to wipe without --yes");
            }
            vault.wipe().await?;
            println!("Personal vault wiped");
        }
    }
    Ok(())
}

async fn unlock_personal(vault: &PersonalVault) -> Result<()> {
    if vault.is_unlocked() {
        info!("personal vault session resumed");
        return Ok(());
    }
    let password = prompt_password_once("Personal vault password: ")?;
    vault.unlock(&password).await?;
    Ok(())
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("VAULT_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    prompt_secret(prompt)
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("VAULT_PASSWORD") {
        if !pw.is_empty() {
            if let Ok(confirm) = std::env::var("VAULT_PASSWORD_CONFIRM") {
                if confirm != pw {
                    return Err(anyhow!("password confirmation mismatch"));
                }
            }
            return Ok(Zeroizing::new(pw));
        }
    }
    confirmed_prompt(prompt)
}

/// New password for `passwd`; `VAULT_NEW_PASSWORD` skips the prompt.
fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("VAULT_NEW_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    confirmed_prompt(prompt)
}

fn confirmed_prompt(prompt: &str) -> Result<Zeroizing<String>> {
    let first = prompt_secret(prompt)?;
    if first.is_empty() {
        return Err(anyhow!("password must not be empty"));
    }
    let second = prompt_secret("Confirm password: ")?;
    if *first != *second {
        return Err(anyhow!("passwords do not match"));
    }
    Ok(first)
}

fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(secret))
}
