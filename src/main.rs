use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zoho_books::export::{self, default_file_name};
use zoho_books::{
    bridge, Client, ClientOptions, CredentialStore, Credentials, CredentialsUpdate, ExportFormat,
    FileStore, InvoiceFilter, LineItem, NewContact, NewInvoice,
};

/// Overrides for the Zoho servers, mostly useful against a sandbox or a mock.
const ENV_ACCOUNTS_URL: &str = "ZOHO_ACCOUNTS_URL";
const ENV_BOOKS_URL: &str = "ZOHO_BOOKS_URL";

#[derive(Parser, Debug)]
#[command(name = "zoho-books", version, about = "Manage Zoho Books contacts and invoices")]
struct Cli {
    /// Credential file to use instead of the default one
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Credential management
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Customer management
    Contacts {
        #[command(subcommand)]
        action: ContactsCommand,
    },

    /// Invoice listing, creation and export
    Invoices {
        #[command(subcommand)]
        action: InvoicesCommand,
    },

    /// Paid versus unpaid totals
    Summary {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Answer bridge messages, one JSON object per line, on stdin/stdout
    Serve,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Enter all credentials interactively
    Setup,

    /// Change some of the stored credentials
    Update(UpdateArgs),

    /// Print the stored credentials with secrets abbreviated
    Show,

    /// Delete all stored credentials
    Delete {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct UpdateArgs {
    #[arg(long)]
    organization_id: Option<String>,

    #[arg(long)]
    client_id: Option<String>,

    #[arg(long)]
    client_secret: Option<String>,

    #[arg(long)]
    refresh_token: Option<String>,

    /// Customer used for new invoices when none is given; empty to clear
    #[arg(long)]
    default_customer_id: Option<String>,
}

impl From<UpdateArgs> for CredentialsUpdate {
    fn from(args: UpdateArgs) -> Self {
        CredentialsUpdate {
            organization_id: args.organization_id,
            client_id: args.client_id,
            client_secret: args.client_secret,
            refresh_token: args.refresh_token,
            default_customer_id: args.default_customer_id,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ContactsCommand {
    /// List customers, optionally searching by name or email
    List {
        #[arg(long)]
        search: Option<String>,
    },

    /// Add a new customer
    Add {
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Invoice status, e.g. paid, unpaid, draft
    #[arg(long)]
    status: Option<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    customer_id: Option<String>,
}

impl From<FilterArgs> for InvoiceFilter {
    fn from(args: FilterArgs) -> Self {
        InvoiceFilter {
            status: args.status,
            start_date: args.from,
            end_date: args.to,
            customer_id: args.customer_id,
        }
    }
}

#[derive(Subcommand, Debug)]
enum InvoicesCommand {
    List(FilterArgs),

    /// Create an invoice with a single line item
    Create {
        /// Defaults to the configured default customer
        #[arg(long)]
        customer_id: Option<String>,

        #[arg(long)]
        item_id: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        rate: f64,

        #[arg(long, default_value_t = 1.0)]
        quantity: f64,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        due_date: Option<String>,

        #[arg(long)]
        reference_number: Option<String>,
    },

    /// Write invoices to a CSV or JSON file
    Export {
        /// csv or json
        #[arg(long)]
        format: String,

        /// Output file, defaults to zoho_invoices_<timestamp>.<format>
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zoho_books=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = match &cli.config_file {
        Some(path) => FileStore::new(path),
        None => FileStore::open_default()?,
    };
    let options = client_options(cli.timeout);

    match cli.command {
        Command::Config { action } => configure(&store, action),
        Command::Serve => serve(options).await,
        Command::Contacts { action } => {
            let client = Client::with_options(load_credentials(&store)?, options)?;

            match action {
                ContactsCommand::List { search } => {
                    print_json(&client.list_contacts(search.as_deref()).await?)
                }
                ContactsCommand::Add { name, email, phone } => {
                    let contact = NewContact {
                        email,
                        phone,
                        ..NewContact::named(name)
                    };
                    let created = client.create_contact(&contact).await?;
                    println!("New customer created:");
                    print_json(&created)
                }
            }
        }
        Command::Invoices { action } => {
            let client = Client::with_options(load_credentials(&store)?, options)?;

            match action {
                InvoicesCommand::List(filter) => {
                    print_json(&client.list_invoices(&filter.into()).await?)
                }
                InvoicesCommand::Create {
                    customer_id,
                    item_id,
                    description,
                    rate,
                    quantity,
                    date,
                    due_date,
                    reference_number,
                } => {
                    let invoice = NewInvoice {
                        customer_id: customer_id.unwrap_or_default(),
                        line_items: vec![LineItem {
                            item_id,
                            description,
                            rate,
                            quantity,
                        }],
                        date,
                        due_date,
                        reference_number,
                    };
                    let created = client.create_invoice(&invoice).await?;
                    println!("New invoice created:");
                    print_json(&created)
                }
                InvoicesCommand::Export {
                    format,
                    output,
                    filter,
                } => {
                    let format: ExportFormat = format.parse()?;
                    let path = output.unwrap_or_else(|| {
                        PathBuf::from(default_file_name(&chrono::Local::now(), format))
                    });

                    let count =
                        export::export_invoices(&client, &filter.into(), format, &path).await?;
                    println!("Exported {} invoices to {}", count, path.display());
                    Ok(())
                }
            }
        }
        Command::Summary { from, to } => {
            let client = Client::with_options(load_credentials(&store)?, options)?;
            let summary = client
                .payment_summary(from.as_deref(), to.as_deref())
                .await?;

            println!("Payment Summary:");
            print_json(&summary)
        }
    }
}

fn client_options(timeout: u64) -> ClientOptions {
    let mut options = ClientOptions::default().timeout(timeout);

    if let Ok(url) = std::env::var(ENV_ACCOUNTS_URL) {
        options = options.accounts_url(url);
    }
    if let Ok(url) = std::env::var(ENV_BOOKS_URL) {
        options = options.books_url(url);
    }

    options
}

/// Stored credentials win; the environment is the fallback.
fn load_credentials(store: &FileStore) -> Result<Credentials> {
    let credentials = match store.load()? {
        Some(credentials) => credentials,
        None => Credentials::from_env(),
    };

    if !credentials.is_complete() {
        bail!(
            "Missing credentials: {}. Run `zoho-books config setup` or set the ZOHO_* environment variables.",
            credentials.missing_fields().join(", ")
        );
    }

    Ok(credentials)
}

fn configure(store: &FileStore, action: ConfigCommand) -> Result<()> {
    match action {
        ConfigCommand::Setup => {
            println!("Zoho Books - Credential Setup");
            println!("=============================");

            let mut credentials = Credentials::new(
                prompt("Enter Zoho Organization ID: ")?,
                prompt("Enter Zoho Client ID: ")?,
                prompt("Enter Zoho Client Secret: ")?,
                prompt("Enter Zoho Refresh Token: ")?,
            );
            let customer = prompt("Enter default customer ID (optional, press Enter to skip): ")?;
            credentials.default_customer_id = Some(customer).filter(|c| !c.is_empty());

            credentials.ensure_complete()?;
            store.save(&credentials)?;
            println!("Credentials stored in {}", store.path().display());
        }
        ConfigCommand::Update(args) => {
            let update: CredentialsUpdate = args.into();
            if update.is_empty() {
                bail!("Nothing to update");
            }

            zoho_books::store::update(store, update)?;
            println!("Credentials updated successfully!");
        }
        ConfigCommand::Show => match store.load()? {
            Some(credentials) => println!("{:#?}", credentials),
            None => println!("No credentials stored in {}", store.path().display()),
        },
        ConfigCommand::Delete { yes } => {
            let confirmed = yes
                || prompt("Are you sure you want to delete all stored credentials? (yes/no): ")?
                    .eq_ignore_ascii_case("yes");

            if confirmed {
                store.delete()?;
                println!("Credentials deleted successfully!");
            }
        }
    }

    Ok(())
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read from stdin")?;

    Ok(answer.trim().to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Relay newline delimited bridge messages until stdin closes.
async fn serve(options: ClientOptions) -> Result<()> {
    let bridge = bridge::spawn(options);

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    tracing::info!("bridge listening on stdin");

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let reply = bridge.send_json(message).await?;

        stdout.write_all(serde_json::to_string(&reply)?.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
