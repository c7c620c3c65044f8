//! firmdesk - client records for law-firm practice management.
//!
//! Command-line front end over the client reconciliation layer.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use firmdesk::clients::{
    ClientPatch, ClientRecord, ClientSession, CreateClientRequest, ExportFormat, NewClient,
};
use firmdesk::config::{Config, LoggingConfig};
use firmdesk::settings::Settings;
use firmdesk::{db, identity};

/// firmdesk - client records for law-firm practice management
#[derive(Parser, Debug)]
#[command(name = "firmdesk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to settings file (defaults to ./firmdesk.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage client records
    #[command(subcommand)]
    Clients(ClientsCommand),
}

#[derive(Subcommand, Debug)]
enum ClientsCommand {
    /// List clients (active by default)
    #[command(alias = "ls")]
    List {
        /// Show dropped clients instead of active ones
        #[arg(long)]
        dropped: bool,

        /// Filter by name, email, company, account number or tag
        #[arg(long)]
        search: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one client
    Show {
        /// Client id
        id: String,
    },

    /// Create a client
    Create(CreateArgs),

    /// Update profile fields of a client
    Update(UpdateArgs),

    /// Mark a client dropped
    Drop {
        /// Client id
        id: String,

        /// Why the firm stopped representing the client
        #[arg(long)]
        reason: String,
    },

    /// Delete a client and its login account
    Delete {
        /// Client id
        id: String,
    },

    /// Add or remove a tag
    Tag {
        /// Client id
        id: String,

        /// Tag to add
        #[arg(long, conflicts_with = "remove", required_unless_present = "remove")]
        add: Option<String>,

        /// Tag to remove
        #[arg(long)]
        remove: Option<String>,
    },

    /// Assign the responsible attorney (omit --attorney to unassign)
    Assign {
        /// Client id
        id: String,

        /// Attorney id
        #[arg(long)]
        attorney: Option<String>,
    },

    /// Replace a client's notes
    Notes {
        /// Client id
        id: String,

        /// New notes text
        text: String,
    },

    /// Export all clients
    Export {
        /// Output format (`csv` or `json`)
        #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Full name
    #[arg(long)]
    name: String,

    /// Email address
    #[arg(long)]
    email: String,

    #[arg(long, default_value = "")]
    phone: String,

    /// Company name
    #[arg(long, default_value = "")]
    company: String,

    #[arg(long, default_value = "")]
    address: String,

    #[arg(long, default_value = "")]
    notes: String,

    /// Tag (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Responsible attorney id
    #[arg(long)]
    attorney: Option<String>,

    /// Login password; when set, a login account is created for the client
    #[arg(long, env = "FIRMDESK_CLIENT_PASSWORD", hide = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Client id
    id: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    company: Option<String>,

    #[arg(long)]
    address: Option<String>,

    /// Replace the tag list (repeatable)
    #[arg(long = "tag")]
    tags: Option<Vec<String>>,

    /// Responsible attorney id
    #[arg(long, conflicts_with = "clear_attorney")]
    attorney: Option<String>,

    /// Remove the responsible attorney
    #[arg(long)]
    clear_attorney: bool,
}

impl UpdateArgs {
    fn into_patch(self) -> ClientPatch {
        let assigned_attorney_id = match (self.attorney, self.clear_attorney) {
            (Some(attorney), _) => Some(Some(attorney)),
            (None, true) => Some(None),
            (None, false) => None,
        };
        ClientPatch {
            full_name: self.name,
            email: self.email,
            phone: self.phone,
            company_name: self.company,
            address: self.address,
            notes: None,
            tags: self.tags,
            assigned_attorney_id,
            user_id: None,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("firmdesk=info"));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_summary(record: &ClientRecord) {
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", record.tags.join(", "))
    };
    println!(
        "{:<6} {}  {} <{}>{}",
        record.account_number, record.id, record.full_name, record.email, tags
    );
}

fn print_record(record: &ClientRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

async fn ensure_loaded(session: &ClientSession) -> Result<()> {
    if !session.reload().await {
        bail!("could not load clients from the remote store (see log for details)");
    }
    Ok(())
}

async fn run_clients(session: &ClientSession, command: ClientsCommand) -> Result<()> {
    match command {
        ClientsCommand::List {
            dropped,
            search,
            json,
        } => {
            ensure_loaded(session).await?;
            let records: Vec<ClientRecord> = match search {
                Some(query) => session
                    .store()
                    .search(&query)
                    .await
                    .into_iter()
                    .filter(|r| r.is_dropped == dropped)
                    .collect(),
                None => {
                    let snapshot = session.store().snapshot().await;
                    if dropped {
                        snapshot.dropped
                    } else {
                        snapshot.active
                    }
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No clients found.");
            } else {
                records.iter().for_each(print_summary);
            }
        }
        ClientsCommand::Show { id } => {
            let Some(record) = session.repository().get_by_id(&id).await? else {
                bail!("client {id} not found");
            };
            print_record(&record)?;
        }
        ClientsCommand::Create(args) => {
            let client = NewClient {
                full_name: args.name,
                email: args.email,
                phone: args.phone,
                company_name: args.company,
                address: args.address,
                notes: args.notes,
                tags: args.tags,
                assigned_attorney_id: args.attorney,
                user_id: None,
            };
            let request = CreateClientRequest {
                client,
                password: args.password.map(SecretString::from),
            };
            let record = session.create_client(request).await?;
            print_record(&record)?;
        }
        ClientsCommand::Update(args) => {
            let id = args.id.clone();
            let record = session.update_client(&id, args.into_patch()).await?;
            print_record(&record)?;
        }
        ClientsCommand::Drop { id, reason } => {
            let record = session.drop_client(&id, &reason).await?;
            print_record(&record)?;
        }
        ClientsCommand::Delete { id } => {
            session.delete_client(&id).await?;
            println!("Deleted client {id}");
        }
        ClientsCommand::Tag { id, add, remove } => {
            let record = match (add, remove) {
                (Some(tag), _) => session.add_tag(&id, &tag).await?,
                (None, Some(tag)) => session.remove_tag(&id, &tag).await?,
                (None, None) => bail!("pass --add or --remove"),
            };
            print_summary(&record);
        }
        ClientsCommand::Assign { id, attorney } => {
            let record = session.assign_attorney(&id, attorney.as_deref()).await?;
            print_summary(&record);
        }
        ClientsCommand::Notes { id, text } => {
            let record = session.set_notes(&id, &text).await?;
            print_record(&record)?;
        }
        ClientsCommand::Export { format, output } => {
            let format: ExportFormat = format.parse()?;
            ensure_loaded(session).await?;
            let rendered = session.export(format).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Wrote {format} export to {}", path.display());
                }
                None => print!("{rendered}"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let config = Config::resolve(&settings).context("invalid configuration")?;
    init_tracing(&config.logging);

    tracing::debug!(backend = config.remote.backend.as_str(), "Starting firmdesk");

    let remote = db::connect_from_config(&config.remote).await?;
    let identity = identity::provider_from_config(&config.identity, &config.remote)?;
    let session = ClientSession::new(remote, identity, &config.clients);

    match cli.command {
        Commands::Clients(command) => run_clients(&session, command).await,
    }
}
