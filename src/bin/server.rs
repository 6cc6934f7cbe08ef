//! keepr-server: binds the store, token service, and RPC surface together.
//!
//! Construction order matters: the private key and database are opened
//! once at startup as immutable, process-wide singletons (wrapped in `Arc`
//! where shared mutable access isn't needed), then handed to the service
//! impl. There is no additional shared mutable state beyond the store's own
//! internal mutex.

use std::sync::Arc;

use clap::Parser;
use keepr::auth::TokenService;
use keepr::config::{ServerArgs, ServerConfig};
use keepr::controller::KeeprService;
use keepr::db::Database;
use keepr::interceptor::AuthInterceptor;
use keepr::proto::note_services_server::NoteServicesServer;
use keepr::proto::user_services_server::UserServicesServer;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    let config = ServerConfig::load_and_persist(&args)?;

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let private_key_pem = std::fs::read_to_string(&config.private_key_path).map_err(|e| {
        tracing::error!(path = %config.private_key_path, error = %e, "failed to read private key");
        e
    })?;
    let tokens = Arc::new(TokenService::from_pkcs1_pem(&private_key_pem)?);

    let db = Database::open(&config.sqlite_path).map_err(|e| {
        tracing::error!(path = %config.sqlite_path, error = %e, "failed to open database");
        e
    })?;

    // `Database` wraps an `Arc<Mutex<Connection>>`, so cloning it for the
    // second service impl shares the same underlying connection rather than
    // opening a second one.
    let user_server = UserServicesServer::new(KeeprService::new(db.clone(), tokens.clone()));

    // The note service needs the auth interceptor attached; the user
    // service (Register, Login) must not have it, since those two methods
    // are the ones exempted from token checks.
    let note_server = NoteServicesServer::with_interceptor(
        KeeprService::new(db, tokens.clone()),
        AuthInterceptor::new(tokens),
    );

    let addr = config.listen_addr.parse()?;
    tracing::info!(%addr, "keepr-server listening");

    Server::builder()
        .add_service(user_server)
        .add_service(note_server)
        .serve(addr)
        .await?;

    Ok(())
}
