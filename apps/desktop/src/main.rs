use std::{io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::load_settings,
    query_session::echo_answer,
    display::{
        describe_citation, format_file_size, format_processing_time, format_sources,
        format_upload_time,
    },
    FileOutcome, MessageStatus, UploadFile, Workspace,
};
use shared::domain::{CitationId, DocumentId};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Document upload and question answering against a retrieval server")]
struct Cli {
    /// Overrides `server_url` from client.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    #[command(subcommand)]
    Docs(DocsCommand),
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Ask {
        query: String,
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        top_k: Option<u32>,
        #[arg(long)]
        no_reranker: bool,
        /// Print the full text of this citation after the answer.
        #[arg(long)]
        show_citation: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum DocsCommand {
    List,
    Delete { document_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Command::Ask {
        stream,
        top_k,
        no_reranker,
        ..
    } = &cli.command
    {
        settings.stream |= *stream;
        if let Some(top_k) = top_k {
            settings.top_k = *top_k;
        }
        if *no_reranker {
            settings.use_reranker = false;
        }
    }

    debug!(?settings, "settings resolved");
    let workspace = Workspace::from_settings(&settings)?;

    match cli.command {
        Command::Health => {
            let health = workspace.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Docs(DocsCommand::List) => {
            workspace.start().await?;
            let documents = workspace.registry().documents().await;
            if documents.is_empty() {
                println!("No documents uploaded yet.");
            }
            for doc in documents {
                println!(
                    "{}  {}  {}  {}  {} chunks",
                    doc.id,
                    doc.filename,
                    format_file_size(doc.file_size),
                    format_upload_time(&doc.upload_time),
                    doc.num_chunks
                );
            }
        }
        Command::Docs(DocsCommand::Delete { document_id }) => {
            let confirmation = workspace
                .delete_document(&DocumentId::from(document_id.as_str()))
                .await
                .map_err(|e| anyhow::anyhow!(e.reason()))?;
            println!(
                "{}",
                confirmation
                    .message
                    .unwrap_or_else(|| format!("deleted {document_id}"))
            );
        }
        Command::Upload { paths } => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                let file = UploadFile::from_path(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                files.push(file);
            }
            let report = workspace.upload(files).await;
            for outcome in &report.outcomes {
                match outcome {
                    FileOutcome::Accepted { filename, document } => {
                        println!(
                            "uploaded {filename} as {} ({} chunks)",
                            document.id, document.num_chunks
                        )
                    }
                    FileOutcome::Failed { filename, error } => {
                        println!("failed {filename}: {}", error.reason())
                    }
                }
            }
            if !report.any_accepted() {
                bail!("no file was accepted");
            }
        }
        Command::Ask {
            query,
            show_citation,
            ..
        } => {
            let printer = settings.stream.then(|| {
                let events = workspace.subscribe_events();
                tokio::spawn(echo_answer(events, |delta| {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }))
            });

            let answer = workspace
                .ask(&query)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            let streamed = printer.is_some();
            if let Some(printer) = printer {
                let printed = printer.await.unwrap_or(0);
                if answer.status() == MessageStatus::Complete {
                    if let Some(rest) = answer.content().get(printed..) {
                        print!("{rest}");
                    }
                }
                println!();
            }

            if !streamed || answer.status() == MessageStatus::Error {
                println!("{}", answer.content());
            }
            if let Some(citations) = answer.citations() {
                println!("Sources: {}", format_sources(citations));
            }
            if let Some(ms) = answer.processing_time_ms() {
                println!("Answered in {}", format_processing_time(ms));
            }
            if let Some(id) = show_citation {
                match workspace.chat().resolve_citation(CitationId(id)).await {
                    Some(citation) => println!("\n{}", describe_citation(&citation)),
                    None => println!("\nNo citation [{id}] on the latest answer."),
                }
            }
            if answer.status() == MessageStatus::Error {
                bail!("query failed");
            }
        }
    }

    Ok(())
}
