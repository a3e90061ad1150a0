//! DEEPWELL command line client.

mod shell;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deepwell_client::Client;
use shell::Shell;

#[derive(Parser)]
#[command(name = "deepwell")]
#[command(about = "deepwell is the DEEPWELL command line client")]
#[command(version)]
struct Cli {
    /// The hostname of the server to connect to.
    #[arg(short = 'n', long, default_value = "localhost")]
    host: String,

    /// The port of the server to connect to.
    #[arg(short = 'p', long, default_value_t = 20001)]
    port: u16,

    /// Skip TLS certificate verification.
    #[arg(short = 's', long)]
    skip: bool,

    /// The access key to use when making requests. If it is not supplied,
    /// you will be prompted to input your key.
    #[arg(short = 'k', long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the deepwell version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        println!(
            "deepwell {} {}",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        );
        return Ok(());
    }

    let key = match cli.key {
        Some(key) => key,
        None => rpassword::prompt_password("Server Key: ")?,
    };

    let mut client = Client::new(&cli.host, cli.port, key);
    client.set_skip_verification(cli.skip);

    let mut shell = Shell::new(cli.host.clone(), cli.port, client);
    if let Err(err) = shell.run().await {
        eprintln!("deepwell: {err}");
        std::process::exit(1);
    }
    Ok(())
}
