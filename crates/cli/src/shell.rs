//! The interactive read-eval loop.

use std::io::{self, Write};

use anyhow::Result;
use deepwell_client::Client;
use tokio::fs::File;

pub struct Shell {
    hostname: String,
    port: u16,
    client: Client,
    /// The currently selected drive; empty until `drive <name>` is used.
    drive: String,
}

impl Shell {
    pub fn new(hostname: String, port: u16, client: Client) -> Self {
        Self {
            hostname,
            port,
            client,
            drive: String::new(),
        }
    }

    /// Connect, then loop reading commands until quit or EOF.
    pub async fn run(&mut self) -> Result<()> {
        println!("Connecting to {}:{}", self.hostname, self.port);
        self.client.ping().await?;

        let stdin = io::stdin();
        loop {
            print!("{}:{}> ", self.hostname, self.drive);
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.read_line(&mut line)? == 0 {
                return Ok(());
            }
            self.command(&line).await;
        }
    }

    /// Run one shell command. Errors are printed, never fatal.
    async fn command(&mut self, line: &str) {
        let args = match shell_words::split(line) {
            Ok(args) => args,
            Err(err) => {
                println!("{err}");
                return;
            }
        };
        let Some(name) = args.first() else {
            return;
        };

        match name.as_str() {
            "quit" | "exit" => std::process::exit(0),
            "help" => self.help(),
            "drive" => {
                if args.len() != 2 {
                    println!(
                        "Invalid arguments for drive command. Please provide a drive to switch to."
                    );
                    return;
                }
                self.drive = args[1].clone();
            }
            "drives" => match self.client.drives().await {
                Ok(drives) => println!("{}", drives.join("\n")),
                Err(err) => println!("{err}"),
            },
            "ping" => match self.client.ping().await {
                Ok(()) => println!("PONG"),
                Err(err) => println!("{err}"),
            },
            "create" => {
                if args.len() != 2 {
                    println!(
                        "Invalid arguments for create command. Please provide a path to create."
                    );
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                if let Err(err) = self.client.create(&drive, &args[1]).await {
                    println!("{err}");
                }
            }
            "mkdir" => {
                if args.len() != 2 {
                    println!(
                        "Invalid arguments for mkdir command. Please provide a path to create."
                    );
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                if let Err(err) = self.client.mkdir(&drive, &args[1]).await {
                    println!("{err}");
                }
            }
            "download" => {
                if args.len() != 3 {
                    println!(
                        "Invalid arguments for download command. Please provide a path to \
                         download and a path to save to."
                    );
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                self.download(&drive, &args[1], &args[2]).await;
            }
            "upload" => {
                if args.len() != 3 {
                    println!(
                        "Invalid arguments for upload command. Please provide a path to upload \
                         and a path to upload to."
                    );
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                self.upload(&drive, &args[1], &args[2]).await;
            }
            "ls" | "list" | "dir" => {
                if args.len() > 2 {
                    println!("Invalid arguments for list command. Please provide a path to list.");
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                let path = args.get(1).map(String::as_str).unwrap_or("");
                match self.client.list(&drive, path).await {
                    Ok(items) => {
                        for item in items {
                            if item.is_dir {
                                println!("D {}", item.name);
                            } else {
                                println!("F {}", item.name);
                            }
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            "stat" => {
                if args.len() != 2 {
                    println!("Invalid arguments for stat command. Please provide a path to stat.");
                    return;
                }
                let Some(drive) = self.selected_drive() else {
                    return;
                };
                match self.client.stat(&drive, &args[1]).await {
                    Ok(info) => {
                        println!("{}", args[1]);
                        if info.is_dir {
                            println!("Type: Directory");
                        } else {
                            println!("Type: File");
                            println!("Size: {} bytes", info.size);
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            _ => println!("Unrecognized command. Use the 'help' command to get a list of commands."),
        }
    }

    /// The selected drive, or a hint when none is.
    fn selected_drive(&self) -> Option<String> {
        if self.drive.is_empty() {
            println!("No drive selected. Use the drive command to select a drive.");
            return None;
        }
        Some(self.drive.clone())
    }

    async fn download(&self, drive: &str, remote: &str, local: &str) {
        let mut file = match File::create(local).await {
            Ok(file) => file,
            Err(err) => {
                println!("{err}");
                return;
            }
        };
        match self.client.read(drive, remote, &mut file).await {
            Ok(n) => println!("Successfully wrote {n} bytes to {local}"),
            Err(err) => println!("{err}"),
        }
    }

    async fn upload(&self, drive: &str, local: &str, remote: &str) {
        let mut file = match File::open(local).await {
            Ok(file) => file,
            Err(err) => {
                println!("{err}");
                return;
            }
        };
        let size = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(err) => {
                println!("{err}");
                return;
            }
        };

        // Make sure the remote file exists, then stream into it.
        if let Err(err) = self.client.create(drive, remote).await {
            println!("{err}");
            return;
        }
        match self.client.write(drive, remote, size, &mut file).await {
            Ok(()) => println!("Successfully wrote {size} bytes to {remote}"),
            Err(err) => println!("{err}"),
        }
    }

    fn help(&self) {
        println!("Commands:");
        println!("  drive <name>              select the drive to work in");
        println!("  drives                    list the drives you may access");
        println!("  ping                      check the connection");
        println!("  create <path>             create an empty file");
        println!("  mkdir <path>              create a directory");
        println!("  download <remote> <local> download a file");
        println!("  upload <local> <remote>   upload a file");
        println!("  ls|list|dir [path]        list a directory");
        println!("  stat <path>               show file or directory info");
        println!("  quit|exit                 leave the shell");
    }
}
