//! conntrack command - list the kernel connection tracking table.
//!
//! `conntrack list` prints one line per IPv4 connection, `conntrack xml`
//! prints the table as an XML document.

mod modules;

use std::future::Future;
use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use ctlink::netlink::conntrack::{AddressFamily, Conntrack, DumpOptions};
use ctlink::output::{self, OutputFormat};
use ctlink::Error;
use tokio::sync::watch;
use tracing::debug;

const USAGE: &str = "usage: conntrack command\ncommand: list or xml";

#[derive(Parser)]
#[command(
    name = "conntrack",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// What to print.
    #[arg(value_enum)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    /// One line per connection.
    List,
    /// XML document.
    Xml,
}

impl From<Command> for OutputFormat {
    fn from(command: Command) -> Self {
        match command {
            Command::List => OutputFormat::Line,
            Command::Xml => OutputFormat::Xml,
        }
    }
}

/// Process-wide state shared by the command.
struct AppContext {
    shutdown: watch::Receiver<bool>,
}

impl AppContext {
    /// Install SIGINT/SIGTERM handlers.
    fn new() -> std::io::Result<Self> {
        let (tx, rx) = watch::channel(false);
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => debug!("received SIGINT"),
                _ = sigterm.recv() => debug!("received SIGTERM"),
            }
            let _ = tx.send(true);
        });

        Ok(Self { shutdown: rx })
    }

    /// Resolves once a termination signal arrived.
    fn shutdown_signal(&self) -> impl Future<Output = ()> {
        let mut rx = self.shutdown.clone();
        async move {
            // A closed channel means the handler task is gone; wait forever.
            if rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            debug!(error = %e, "invalid arguments");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = modules::ensure_loaded().await {
        eprintln!("ERROR: {e}");
        return ExitCode::FAILURE;
    }

    let ctx = match AppContext::new() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("ERROR: cannot install signal handlers: {e}");
            return ExitCode::FAILURE;
        }
    };

    run(&ctx, cli.command.into()).await
}

async fn run(ctx: &AppContext, format: OutputFormat) -> ExitCode {
    // Kernels without nf_conntrack_acct omit counters; print those as 0.
    let ct = Conntrack::with_options(DumpOptions::new().require_counters(false));

    let table = match ct
        .dump_until(AddressFamily::Inet, ctx.shutdown_signal())
        .await
    {
        Ok(table) => table,
        Err(Error::Cancelled) => {
            println!("Interrupted.");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            println!("ERROR: {e}");
            return ExitCode::SUCCESS;
        }
    };

    if table.skipped() > 0 {
        debug!(skipped = table.skipped(), "some conntrack records were skipped");
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = output::write_table(&mut out, &table, format) {
        let _ = writeln!(std::io::stderr(), "ERROR: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
