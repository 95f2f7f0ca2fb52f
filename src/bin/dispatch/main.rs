#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Sends a templated email to every recipient and prints a JSON report

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mail_dispatch::{
    domain::dispatch::DispatchServiceImpl,
    infrastructure::{
        cli::{cancel_on_signal, run, write_report, Args},
        email::smtp::SMTPMailer,
    },
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output = args.output.clone();
    let form = args.into_form().await?;

    let cancellation = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancellation.clone()));

    let service = DispatchServiceImpl::new(Arc::new(SMTPMailer::new()));
    let result = run(&service, form, &cancellation).await?;

    cancellation.cancel();

    write_report(&result, output.as_deref()).await?;

    Ok(())
}
