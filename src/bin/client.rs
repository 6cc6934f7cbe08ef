//! keepr-client: a minimal subcommand-driven front end over `ClientSession`,
//! standing in for a full terminal UI (forms, page navigation, input
//! capture) while still exercising register/login/add/list end to end.

use clap::{Parser, Subcommand};
use keepr::config::{ClientArgs, ClientConfig};
use keepr::session::ClientSession;
use keepr::typed_record::{Header, Text, TypedRecord};
use uuid::Uuid;

#[derive(Subcommand)]
enum Command {
    Register { username: String, email: String, password: String },
    Login { email: String, password: String },
    AddText { email: String, password: String, name: String, body: String },
    List { email: String, password: String },
}

#[derive(Parser)]
#[command(name = "keepr-client")]
struct Cli {
    #[command(flatten)]
    config_args: ClientArgs,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ClientConfig::load_and_persist(&cli.config_args)?;

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut session = ClientSession::connect(&config.server_addr).await?;

    match cli.command {
        Command::Register { username, email, password } => {
            session.register(&username, &email, &password).await?;
            println!("registered and authenticated");
        }
        Command::Login { email, password } => {
            session.login(&email, &password).await?;
            println!("authenticated");
        }
        Command::AddText { email, password, name, body } => {
            session.login(&email, &password).await?;
            let record = TypedRecord::Text {
                header: Header {
                    id: Uuid::new_v4(),
                    name,
                    created_at: chrono::Utc::now().timestamp(),
                    metadata: vec![],
                },
                fields: Text { body },
            };
            session.add_or_update(record).await?;
            println!("stored");
        }
        Command::List { email, password } => {
            session.login(&email, &password).await?;
            for record in session.load_all().await? {
                println!("{} [{}]: {}", record.header().id, record.type_tag(), record.header().name);
            }
        }
    }

    Ok(())
}
