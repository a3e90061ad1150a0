//! One handler per protocol verb.
//!
//! Every handler owns the rest of the exchange once dispatch hands it the
//! request: it reads its arg block, applies policy, drains any pending
//! payload, and emits exactly one response. Recoverable failures become
//! FAILED responses; only transport errors propagate.

use deepwell_core::PROTOCOL_HEADER;
use deepwell_core::auth::Permissions;
use deepwell_drive::{Drive, DriveError};
use deepwell_wire::{Status, WireError, WireResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::request::Request;
use crate::server::ServerState;

/// Protocol verbs. The request layer lowercases the verb line before
/// parsing, which makes matching case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Drives,
    Create,
    Mkdir,
    Read,
    List,
    Stat,
    Write,
    Remove,
    Move,
}

impl Command {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "ping" => Some(Self::Ping),
            "drives" => Some(Self::Drives),
            "create" => Some(Self::Create),
            "mkdir" => Some(Self::Mkdir),
            "read" => Some(Self::Read),
            "list" => Some(Self::List),
            "stat" => Some(Self::Stat),
            "write" => Some(Self::Write),
            "remove" => Some(Self::Remove),
            "move" => Some(Self::Move),
            _ => None,
        }
    }
}

/// Route a request to its verb handler.
pub async fn dispatch<S>(
    state: &ServerState,
    req: &mut Request<S>,
    perms: &Permissions,
) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(command) = Command::parse(&req.command) else {
        req.framed.consume().await?;
        req.framed.consume().await?;
        let verb = req.command.clone();
        return req.send_error(&format!("invalid command {verb}")).await;
    };

    match command {
        Command::Ping => ping(req).await,
        Command::Drives => drives(req, perms).await,
        Command::Create => create(state, req, perms).await,
        Command::Mkdir => mkdir(state, req, perms).await,
        Command::Read => read(state, req, perms).await,
        Command::List => list(state, req, perms).await,
        Command::Stat => stat(state, req, perms).await,
        Command::Write => write(state, req, perms).await,
        Command::Remove => remove(state, req, perms).await,
        Command::Move => move_(state, req, perms).await,
    }
}

/// Resolve a drive name through the caller's allow-list and the server's
/// drive map. Both failure modes report the same text so a client cannot
/// probe for drives it is not allowed to see.
fn lookup_drive<'state>(
    state: &'state ServerState,
    perms: &Permissions,
    name: &str,
) -> Result<&'state Drive, String> {
    if !perms.drive_allowed(name) {
        return Err(format!("drive not allowed: {name}"));
    }
    state
        .drives
        .get(name)
        .ok_or_else(|| format!("drive not allowed: {name}"))
}

async fn ping<S>(req: &mut Request<S>) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    req.framed.consume().await?;
    req.framed.consume().await?;
    req.send_success("PONG\n").await
}

async fn drives<S>(req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    req.framed.consume().await?;
    req.framed.consume().await?;

    let mut body = format!("{}\n", perms.allowed_drives.len());
    for name in &perms.allowed_drives {
        body.push_str(name);
        body.push('\n');
    }
    req.send_success(&body).await
}

async fn create<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    if !perms.can_write {
        return req.send_error("no write permissions").await;
    }
    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    if let Err(err) = drive.create(&args[1]).await {
        return req.send_error(&err.to_string()).await;
    }

    info!(path = %args[1], "create");
    req.send_success("").await
}

async fn mkdir<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    if !perms.can_write {
        return req.send_error("no write permissions").await;
    }
    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    if let Err(err) = drive.mkdir(&args[1]).await {
        return req.send_error(&err.to_string()).await;
    }

    info!(path = %args[1], "mkdir");
    req.send_success("").await
}

async fn read<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    let stat = match drive.stat(&args[1]).await {
        Ok(stat) => stat,
        Err(err) => return req.send_error(&err.to_string()).await,
    };
    if stat.is_dir {
        let err = DriveError::NotAFile(args[1].clone());
        return req.send_error(&err.to_string()).await;
    }

    info!(path = %args[1], "read");

    // The file body is the response trailer: announce the size, then
    // stream the bytes with nothing after them.
    req.framed.write_line(PROTOCOL_HEADER).await?;
    req.framed.write_line(Status::Success.as_str()).await?;
    req.framed.write_line(&stat.size.to_string()).await?;
    drive
        .read_to(&args[1], &mut req.framed)
        .await
        .map_err(into_wire)?;
    req.framed.flush().await
}

async fn list<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    let items = match drive.list(&args[1]).await {
        Ok(items) => items,
        Err(err) => return req.send_error(&err.to_string()).await,
    };

    let mut body = format!("{}\n", items.len());
    for item in &items {
        body.push_str(if item.is_dir { "d " } else { "f " });
        body.push_str(&item.name);
        body.push('\n');
    }

    info!(path = %args[1], "list");
    req.send_success(&body).await
}

async fn stat<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    let info = match drive.stat(&args[1]).await {
        Ok(info) => info,
        Err(err) => return req.send_error(&err.to_string()).await,
    };

    info!(path = %args[1], "stat");
    if info.is_dir {
        req.send_success("d\n").await
    } else {
        req.send_success(&format!("f {}\n", info.size)).await
    }
}

async fn write<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;

    // The file body is still pending on the wire. Every rejection below
    // must drain it first or the client deadlocks writing it.
    if !perms.can_write {
        req.framed.consume().await?;
        return req.send_error("no write permissions").await;
    }
    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => {
            req.framed.consume().await?;
            return req.send_error(&message).await;
        }
    };

    let size = req.framed.read_length().await?;
    let mut file = match drive.open_write(&args[1]).await {
        Ok(file) => file,
        Err(err) => {
            // Nothing has been streamed yet; the full body is pending.
            req.framed.drain(size).await?;
            return req.send_error(&err.to_string()).await;
        }
    };

    deepwell_drive::copy_exact(&mut req.framed, &mut file, size)
        .await
        .map_err(into_wire)?;
    file.sync_all().await.map_err(WireError::Io)?;

    info!(path = %args[1], "write");
    req.send_success("").await
}

async fn remove<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(2).await?;
    req.framed.consume().await?;

    if !perms.can_write {
        return req.send_error("no write permissions").await;
    }
    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    if let Err(err) = drive.remove(&args[1]).await {
        return req.send_error(&err.to_string()).await;
    }

    info!(path = %args[1], "remove");
    req.send_success("").await
}

async fn move_<S>(state: &ServerState, req: &mut Request<S>, perms: &Permissions) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let args = req.read_args(3).await?;
    req.framed.consume().await?;

    if !perms.can_write {
        return req.send_error("no write permissions").await;
    }
    let drive = match lookup_drive(state, perms, &args[0]) {
        Ok(drive) => drive,
        Err(message) => return req.send_error(&message).await,
    };

    if let Err(err) = drive.rename(&args[1], &args[2]).await {
        return req.send_error(&err.to_string()).await;
    }

    info!(src = %args[1], dest = %args[2], "move");
    req.send_success("").await
}

/// Drive failures that happen mid-stream cannot become FAILED responses
/// (the frame is already half written); they tear the connection down.
fn into_wire(err: DriveError) -> WireError {
    match err {
        DriveError::Io(err) => WireError::Io(err),
        other => WireError::Io(std::io::Error::other(other.to_string())),
    }
}
