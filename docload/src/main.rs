use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::import::ImportArgs;

mod error;
mod import;

#[derive(Parser)]
#[command(name = "docload")]
#[command(about = "Bulk load JSON, CSV and TSV files into MongoDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import records into a collection
    Import {
        #[clap(flatten)]
        inner: ImportArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) =
        docload_observability::init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    {
        eprintln!("{}", snafu::Report::from_error(err));
        return ExitCode::FAILURE;
    }

    let ct = CancellationToken::new();

    let ct_clone = ct.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ct_clone.cancel();
    });

    let result = match cli.command {
        Commands::Import { inner } => inner.run(ct).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", snafu::Report::from_error(&err));
            let code = u8::try_from(err.kind().exit_code()).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
