//! Common test utilities.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use deepwell_core::config::{AuthConfig, CertificateConfig, DriveConfig, ServerConfig};
use deepwell_server::{ServeError, Server};
use tempfile::TempDir;

/// A running server with a generated certificate and one drive named
/// `data`.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
pub struct TestServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    pub cert_pem: String,
    pub data_dir: PathBuf,
    pub accept: tokio::task::JoinHandle<Result<(), ServeError>>,
    _temp: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Start a server with a writing key (`writer`) and a read-only key
    /// (`reader`), both limited to the `data` drive.
    pub async fn start() -> Self {
        Self::start_with(vec![
            auth_entry("writer", &["data"], true),
            auth_entry("reader", &["data"], false),
            auth_entry("outsider", &["elsewhere"], true),
        ])
        .await
    }

    /// Start a server with a custom key table.
    pub async fn start_with(auth: Vec<AuthConfig>) -> Self {
        let temp = tempfile::tempdir().expect("failed to create temp directory");
        let data_dir = temp.path().join("data");
        std::fs::create_dir(&data_dir).expect("failed to create data directory");

        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("failed to generate certificate");
        let cert_pem = cert.cert.pem();
        let cert_path = temp.path().join("cert.pem");
        let key_path = temp.path().join("key.pem");
        std::fs::write(&cert_path, &cert_pem).expect("failed to write certificate");
        std::fs::write(&key_path, cert.key_pair.serialize_pem()).expect("failed to write key");

        let config = ServerConfig {
            address: "127.0.0.1:0".to_string(),
            timeout: "3s".to_string(),
            backlog: 4,
            workers: 2,
            certificate: vec![CertificateConfig {
                cert_file: cert_path,
                key_file: key_path,
            }],
            drive: vec![DriveConfig {
                name: "data".to_string(),
                path: data_dir.clone(),
            }],
            auth,
            ..Default::default()
        };

        let server = Arc::new(Server::bind(&config).await.expect("failed to bind server"));
        let addr = server.local_addr();
        let accept = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve().await })
        };

        Self {
            server,
            addr,
            cert_pem,
            data_dir,
            accept,
            _temp: temp,
        }
    }

    /// A client trusting the server's certificate.
    pub fn client(&self, key: &str) -> deepwell_client::Client {
        let mut client = deepwell_client::Client::new("127.0.0.1", self.addr.port(), key);
        client.set_server_name("localhost");
        client
            .add_root_ca(self.cert_pem.as_bytes())
            .expect("failed to add root CA");
        client
    }
}

#[allow(dead_code)]
pub fn auth_entry(key: &str, drives: &[&str], can_write: bool) -> AuthConfig {
    AuthConfig {
        key: key.to_string(),
        allowed_ips: vec!["127.0.0.1".to_string()],
        allowed_drives: drives.iter().map(|d| d.to_string()).collect(),
        can_write,
    }
}
