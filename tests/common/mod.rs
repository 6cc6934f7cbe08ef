//! Shared harness for end-to-end tests: spins up a real `KeeprService` over
//! an in-process tonic server bound to an ephemeral port, backed by an
//! in-memory SQLite database.

use std::sync::Arc;

use keepr::auth::TokenService;
use keepr::controller::KeeprService;
use keepr::db::Database;
use keepr::interceptor::AuthInterceptor;
use keepr::proto::note_services_server::NoteServicesServer;
use keepr::proto::user_services_server::UserServicesServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

const TEST_KEY_PEM: &str = include_str!("../fixtures/test_rsa_key.pem");

pub struct TestServer {
    pub addr: String,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let db = Database::open_in_memory().expect("open in-memory db");
        let tokens = Arc::new(TokenService::from_pkcs1_pem(TEST_KEY_PEM).expect("load test key"));

        let user_server = UserServicesServer::new(KeeprService::new(db.clone(), tokens.clone()));
        let note_server = NoteServicesServer::with_interceptor(
            KeeprService::new(db, tokens.clone()),
            AuthInterceptor::new(tokens),
        );

        let handle = tokio::spawn(async move {
            Server::builder()
                .add_service(user_server)
                .add_service(note_server)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .expect("server failed");
        });

        // Give the server a moment to start accepting connections.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Self { addr: format!("http://{addr}"), _handle: handle }
    }
}
