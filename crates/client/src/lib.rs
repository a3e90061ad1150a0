//! Client library for the DEEPWELL protocol.
//!
//! Each operation opens its own TLS connection, performs one
//! request/response exchange and closes. There is no session state beyond
//! the key sent with every request.

pub mod error;

pub use error::{ClientError, ClientResult};

use std::sync::Arc;
use std::time::Duration;

use deepwell_core::PROTOCOL_HEADER;
use deepwell_wire::{Framed, Status};
use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

mod verify;

/// Default per-operation I/O deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One entry from a remote directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirItem {
    pub name: String,
    pub is_dir: bool,
}

/// Metadata for a remote path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub is_dir: bool,
    pub size: u64,
}

/// A DEEPWELL client.
pub struct Client {
    host: String,
    port: u16,
    key: String,
    timeout: Duration,
    skip_verification: bool,
    server_name: Option<String>,
    roots: RootCertStore,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            key: key.into(),
            timeout: DEFAULT_TIMEOUT,
            skip_verification: false,
            server_name: None,
            roots: RootCertStore::empty(),
        }
    }

    /// Per-operation I/O deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Accept any server certificate. For testing only.
    pub fn set_skip_verification(&mut self, skip: bool) {
        self.skip_verification = skip;
    }

    /// Override the name presented for TLS verification. Defaults to the
    /// host.
    pub fn set_server_name(&mut self, name: impl Into<String>) {
        self.server_name = Some(name.into());
    }

    /// Add a trusted root certificate in PEM form.
    pub fn add_root_ca(&mut self, pem: &[u8]) -> ClientResult<()> {
        let mut reader = std::io::BufReader::new(pem);
        let mut added = false;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|err| ClientError::BadCertificate(err.to_string()))?;
            self.roots
                .add(cert)
                .map_err(|err| ClientError::BadCertificate(err.to_string()))?;
            added = true;
        }
        if !added {
            return Err(ClientError::BadCertificate(
                "no certificates found in PEM input".to_string(),
            ));
        }
        Ok(())
    }

    /// Ping the server.
    pub async fn ping(&self) -> ClientResult<()> {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "ping", &[]).await?;
        receive_header(&mut framed).await?;
        framed.read_line().await?;
        framed.consume().await?;
        Ok(())
    }

    /// List the drives this key may address.
    pub async fn drives(&self) -> ClientResult<Vec<String>> {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "drives", &[]).await?;
        receive_header(&mut framed).await?;

        let count = parse_count(&framed.read_line().await?)?;
        let mut drives = Vec::with_capacity(count);
        for _ in 0..count {
            drives.push(framed.read_line().await?);
        }
        framed.consume().await?;
        Ok(drives)
    }

    /// Create an empty file on the server.
    pub async fn create(&self, drive: &str, path: &str) -> ClientResult<()> {
        self.simple_request("create", &[drive, path]).await
    }

    /// Create a directory on the server.
    pub async fn mkdir(&self, drive: &str, path: &str) -> ClientResult<()> {
        self.simple_request("mkdir", &[drive, path]).await
    }

    /// Read a remote file into `sink`, returning the byte count. Reads are
    /// bounded by the size the server announces.
    pub async fn read<W>(&self, drive: &str, path: &str, sink: &mut W) -> ClientResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "read", &[drive, path])
            .await?;
        receive_header(&mut framed).await?;

        let size = framed.read_length().await?;
        let mut bounded = (&mut framed).take(size);
        let copied = tokio::io::copy(&mut bounded, sink).await?;
        if copied != size {
            return Err(ClientError::Truncated {
                expected: size,
                actual: copied,
            });
        }
        Ok(copied)
    }

    /// List a remote directory.
    pub async fn list(&self, drive: &str, path: &str) -> ClientResult<Vec<DirItem>> {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "list", &[drive, path])
            .await?;
        receive_header(&mut framed).await?;

        let count = parse_count(&framed.read_line().await?)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(parse_dir_item(&framed.read_line().await?)?);
        }
        framed.consume().await?;
        Ok(items)
    }

    /// Stat a remote path.
    pub async fn stat(&self, drive: &str, path: &str) -> ClientResult<PathInfo> {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "stat", &[drive, path])
            .await?;
        receive_header(&mut framed).await?;

        let info = parse_path_info(&framed.read_line().await?)?;
        framed.consume().await?;
        Ok(info)
    }

    /// Write exactly `size` bytes from `source` to a remote file.
    pub async fn write<R>(
        &self,
        drive: &str,
        path: &str,
        size: u64,
        source: &mut R,
    ) -> ClientResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, "write", &[drive, path])
            .await?;

        // The file body travels as a second length-prefixed payload.
        framed.write_line(&size.to_string()).await?;
        let mut bounded = source.take(size);
        let sent = tokio::io::copy(&mut bounded, &mut framed).await?;
        if sent != size {
            return Err(ClientError::Truncated {
                expected: size,
                actual: sent,
            });
        }
        framed.flush().await?;

        receive_header(&mut framed).await?;
        framed.consume().await?;
        Ok(())
    }

    /// Remove a remote file or empty directory.
    pub async fn remove(&self, drive: &str, path: &str) -> ClientResult<()> {
        self.simple_request("remove", &[drive, path]).await
    }

    /// Move a remote path. The wire verb is `move`.
    pub async fn rename(&self, drive: &str, src: &str, dest: &str) -> ClientResult<()> {
        self.simple_request("move", &[drive, src, dest]).await
    }

    /// Issue a verb whose response carries no body.
    async fn simple_request(&self, command: &str, args: &[&str]) -> ClientResult<()> {
        let mut framed = self.connect().await?;
        self.send_request(&mut framed, command, args).await?;
        receive_header(&mut framed).await?;
        framed.consume().await?;
        Ok(())
    }

    async fn connect(&self) -> ClientResult<Framed<TlsStream<TcpStream>>> {
        let connector = TlsConnector::from(Arc::new(self.tls_config()));
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        let name = self
            .server_name
            .clone()
            .unwrap_or_else(|| self.host.clone());
        let server_name = ServerName::try_from(name.clone())
            .map_err(|_| ClientError::InvalidServerName(name))?;

        let stream = connector.connect(server_name, stream).await?;
        Ok(Framed::new(stream, self.timeout))
    }

    fn tls_config(&self) -> rustls::ClientConfig {
        if self.skip_verification {
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(verify::SkipServerVerification::new())
                .with_no_client_auth()
        } else {
            rustls::ClientConfig::builder()
                .with_root_certificates(self.roots.clone())
                .with_no_client_auth()
        }
    }

    /// Send the request frame: header, key, verb, arg block, empty payload
    /// length (the `write` verb replaces the payload itself).
    async fn send_request<S>(
        &self,
        framed: &mut Framed<S>,
        command: &str,
        args: &[&str],
    ) -> ClientResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        framed.write_line(PROTOCOL_HEADER).await?;
        framed.write_line(&self.key).await?;
        framed.write_line(command).await?;

        let mut block = String::new();
        for arg in args {
            block.push_str(arg);
            block.push('\n');
        }
        framed.write_line(&block.len().to_string()).await?;
        framed.write_raw(block.as_bytes()).await?;

        if command != "write" {
            framed.write_line("0").await?;
        }
        framed.flush().await?;
        Ok(())
    }
}

/// Read and check the response header and status line. A FAILED status
/// carries one message line, surfaced verbatim.
async fn receive_header<S>(framed: &mut Framed<S>) -> ClientResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = framed.read_line().await?;
    if header != PROTOCOL_HEADER {
        return Err(ClientError::InvalidResponse(format!(
            "unexpected header {header:?}"
        )));
    }

    match Status::parse(&framed.read_line().await?)? {
        Status::Success => Ok(()),
        Status::Failed => {
            let message = framed.read_line().await?;
            Err(ClientError::Server(message))
        }
    }
}

fn parse_count(line: &str) -> ClientResult<usize> {
    line.parse::<usize>()
        .map_err(|_| ClientError::InvalidResponse(format!("bad count line {line:?}")))
}

/// Parse one listing line: `d <name>` or `f <name>`.
fn parse_dir_item(line: &str) -> ClientResult<DirItem> {
    match line.split_once(' ') {
        Some(("d", name)) => Ok(DirItem {
            name: name.to_string(),
            is_dir: true,
        }),
        Some(("f", name)) => Ok(DirItem {
            name: name.to_string(),
            is_dir: false,
        }),
        _ => Err(ClientError::InvalidResponse(format!(
            "bad listing line {line:?}"
        ))),
    }
}

/// Parse a stat line: `d` for a directory, `f <size>` for a file.
fn parse_path_info(line: &str) -> ClientResult<PathInfo> {
    if line == "d" {
        return Ok(PathInfo {
            is_dir: true,
            size: 0,
        });
    }
    match line.split_once(' ') {
        Some(("f", size)) => {
            let size = size.parse::<u64>().map_err(|_| {
                ClientError::InvalidResponse(format!("bad stat size in {line:?}"))
            })?;
            Ok(PathInfo {
                is_dir: false,
                size,
            })
        }
        _ => Err(ClientError::InvalidResponse(format!(
            "bad stat line {line:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_lines_parse() {
        assert_eq!(
            parse_dir_item("d photos").unwrap(),
            DirItem {
                name: "photos".to_string(),
                is_dir: true
            }
        );
        assert_eq!(
            parse_dir_item("f report final.pdf").unwrap(),
            DirItem {
                name: "report final.pdf".to_string(),
                is_dir: false
            }
        );
        assert!(parse_dir_item("x what").is_err());
        assert!(parse_dir_item("d").is_err());
    }

    #[test]
    fn stat_lines_parse() {
        assert_eq!(
            parse_path_info("d").unwrap(),
            PathInfo {
                is_dir: true,
                size: 0
            }
        );
        assert_eq!(
            parse_path_info("f 4096").unwrap(),
            PathInfo {
                is_dir: false,
                size: 4096
            }
        );
        assert!(parse_path_info("f lots").is_err());
        assert!(parse_path_info("directory").is_err());
    }

    #[test]
    fn count_lines_parse() {
        assert_eq!(parse_count("0").unwrap(), 0);
        assert_eq!(parse_count("17").unwrap(), 17);
        assert!(parse_count("-1").is_err());
        assert!(parse_count("many").is_err());
    }
}
