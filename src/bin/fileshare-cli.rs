use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use file_share::client::transfer::{refresh_listing, shared_controller};
use file_share::client::{
    ClientSettings, FileShareClient, Language, Notifications, SelectedFile, TransferOutcome,
    run_transfer,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload, list and download files on a file-share server")]
struct Cli {
    /// Server base URL (default: $SERVER_URL or http://localhost:5000)
    #[arg(short, long)]
    server: Option<String>,

    /// Show a notice when an upload completes
    #[arg(long, value_enum, default_value_t = Notifications::Enabled)]
    notifications: Notifications,

    /// Language for labels
    #[arg(long, value_enum, default_value_t = Language::English)]
    language: Language,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a single file, showing progress. Ctrl+C cancels the transfer.
    Upload { path: PathBuf },
    /// List uploaded files, newest first
    List,
    /// Download a file by ID under its original name
    Download {
        id: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the shareable download link for a file
    Link { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_share=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let server = cli
        .server
        .or_else(|| std::env::var("SERVER_URL").ok())
        .unwrap_or_else(|| "http://localhost:5000".to_string());
    let client = FileShareClient::new(&server)?;
    let settings = ClientSettings::new(cli.notifications, cli.language);

    match cli.command {
        Command::Upload { path } => upload(&client, &settings, path).await,
        Command::List => list(&client, &settings).await,
        Command::Download { id, out } => {
            let dest = client.download(&id, &out).await?;
            println!("⬇️  Saved {}", dest.display());
            Ok(())
        }
        Command::Link { id } => {
            println!("{}: {}", settings.labels().download_link, client.download_url(&id)?);
            Ok(())
        }
    }
}

async fn upload(
    client: &FileShareClient,
    settings: &ClientSettings,
    path: PathBuf,
) -> anyhow::Result<()> {
    let file = SelectedFile::from_path(&path).await?;
    println!("📄 {} ({:.2} MB)", file.name, file.size_mb());

    let controller = shared_controller();
    controller
        .lock()
        .map_err(|_| anyhow::anyhow!("controller lock poisoned"))?
        .select(vec![file])?;

    let canceller = controller.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Ok(mut c) = canceller.lock() {
                c.cancel();
            }
        }
    });

    let reporter_target = controller.clone();
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        loop {
            ticker.tick().await;
            if let Ok(c) = reporter_target.lock() {
                print!("\r⏫ {:>3}%", c.progress());
                let _ = std::io::stdout().flush();
            }
        }
    });

    let outcome = run_transfer(&controller, client).await?;
    reporter.abort();
    ctrl_c.abort();
    println!();

    let labels = settings.labels();
    match outcome {
        TransferOutcome::Completed(record) => {
            if settings.notify_enabled() {
                println!("🔔 {}: {}", labels.upload_complete, record.original_name);
            }
            println!("🆔 {}", record.id);
            println!("{}: {}", labels.download_link, client.download_url(&record.id)?);
            if let Ok(c) = controller.lock() {
                println!(
                    "{}: {}  {}: {}  {}: {}",
                    labels.ongoing,
                    c.ongoing_transfers(),
                    labels.completed,
                    c.completed_transfers(),
                    labels.pending,
                    c.pending_transfers()
                );
            }
            Ok(())
        }
        TransferOutcome::Cancelled => {
            println!("✋ Transfer cancelled");
            Ok(())
        }
        TransferOutcome::Failed(message) => Err(anyhow::anyhow!("Upload failed: {}", message)),
    }
}

async fn list(client: &FileShareClient, settings: &ClientSettings) -> anyhow::Result<()> {
    let controller = shared_controller();
    refresh_listing(&controller, client).await;

    let c = controller
        .lock()
        .map_err(|_| anyhow::anyhow!("controller lock poisoned"))?;
    if let Some(err) = c.error() {
        anyhow::bail!("{}", err);
    }
    if c.files().is_empty() {
        println!("{}", settings.labels().no_files);
        return Ok(());
    }
    for file in c.files() {
        println!(
            "{}  {:>10.1} KB  {}  {}",
            file.id,
            file.size as f64 / 1024.0,
            file.upload_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            file.original_name
        );
    }
    Ok(())
}
