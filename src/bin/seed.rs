//! keepr-seed: registers a demo user and inserts three sample records.
//!
//! Talks to a running server exactly as a real client would — through
//! `ClientSession` — so the seeded data is encrypted under the demo
//! account's derived key just like anything a real client would store.

use clap::Parser;
use keepr::session::ClientSession;
use keepr::typed_record::{Card, Credential, Header, Text, TypedRecord};
use uuid::Uuid;

const DEMO_USERNAME: &str = "demo-user";
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "DemoPass123!";

#[derive(Parser)]
#[command(name = "keepr-seed")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    server_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut session = ClientSession::connect(&args.server_addr).await?;

    if session.register(DEMO_USERNAME, DEMO_EMAIL, DEMO_PASSWORD).await.is_err() {
        tracing::info!("demo user already exists, logging in instead");
        session.login(DEMO_EMAIL, DEMO_PASSWORD).await?;
    }

    let now = chrono::Utc::now().timestamp();

    session
        .add_or_update(TypedRecord::Credential {
            header: Header { id: Uuid::new_v4(), name: "GitHub account".into(), created_at: now, metadata: vec![] },
            fields: Credential { username: "demo-user".into(), password: "gh-demo-password".into() },
        })
        .await?;

    session
        .add_or_update(TypedRecord::Text {
            header: Header { id: Uuid::new_v4(), name: "Recovery code".into(), created_at: now, metadata: vec![] },
            fields: Text { body: "1234-5678-9012-3456".into() },
        })
        .await?;

    session
        .add_or_update(TypedRecord::Card {
            header: Header { id: Uuid::new_v4(), name: "Demo card".into(), created_at: now, metadata: vec![] },
            fields: Card {
                bank: "Demo Bank".into(),
                number: "4111111111111111".into(),
                expiry: "12/30".into(),
                cardholder: "Demo User".into(),
                security_code: "123".into(),
            },
        })
        .await?;

    println!("seeded demo user {DEMO_EMAIL} with 3 sample records");
    Ok(())
}
