use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and
// `AttendanceProxyBlocking`. Only the async variant is used here.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn trigger(&self) -> zbus::Result<String>;
    async fn last_result(&self) -> zbus::Result<String>;
    async fn start_training(&self) -> zbus::Result<String>;
    async fn train_status(&self) -> zbus::Result<String>;
    async fn register_user(&self, identity: &str, name: &str) -> zbus::Result<()>;
    async fn enroll_capture(&self, identity: &str) -> zbus::Result<String>;
    async fn reload_model(&self) -> zbus::Result<()>;
    async fn recent_attendance(&self, limit: u32) -> zbus::Result<String>;
    async fn preview_frame(&self) -> zbus::Result<Vec<u8>>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a scan and wait for its result
    Scan {
        /// Print the raw JSON decision instead of a summary line
        #[arg(long)]
        json: bool,
    },
    /// Enroll a new student: register them and capture camera samples
    Enroll {
        /// Student's display name
        #[arg(short, long)]
        name: String,
        /// Student id; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },
    /// Start classifier training and follow its progress
    Train {
        /// Return immediately instead of following progress
        #[arg(long)]
        no_wait: bool,
    },
    /// Show training status
    TrainStatus,
    /// Tell the daemon to reload the classifier from disk
    Reload,
    /// Show recent attendance records
    Recent {
        /// Maximum number of rows
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Save the current preview frame as a PNG
    Preview {
        /// Output file
        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to session bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("is rollcalld running?")?;

    match cli.command {
        Commands::Scan { json } => scan(&proxy, json).await?,
        Commands::Enroll { name, id } => enroll(&proxy, &name, id).await?,
        Commands::Train { no_wait } => train(&proxy, no_wait).await?,
        Commands::TrainStatus => println!("{}", proxy.train_status().await?),
        Commands::Reload => {
            proxy.reload_model().await?;
            println!("Classifier reload requested");
        }
        Commands::Recent { limit } => recent(&proxy, limit).await?,
        Commands::Preview { output } => {
            let png = proxy.preview_frame().await?;
            if png.is_empty() {
                bail!("no preview frame available yet");
            }
            std::fs::write(&output, &png)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Saved {}", output.display());
        }
        Commands::Status => println!("{}", proxy.status().await?),
    }

    Ok(())
}

async fn scan(proxy: &AttendanceProxy<'_>, json: bool) -> Result<()> {
    match proxy.trigger().await?.as_str() {
        "ok" => {}
        "busy" => bail!("daemon is busy with another scan or enrollment"),
        other => bail!("unexpected trigger response: {other}"),
    }

    // Poll until the pipeline produces a decision.
    let raw = loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let raw = proxy.last_result().await?;
        if !raw.is_empty() {
            break raw;
        }
    };

    if json {
        println!("{raw}");
        return Ok(());
    }

    let decision: serde_json::Value = serde_json::from_str(&raw)?;
    match decision["status"].as_str() {
        Some("success") => println!(
            "Welcome {} (confidence {:.2})",
            decision["name"].as_str().unwrap_or("?"),
            decision["confidence"].as_f64().unwrap_or(0.0)
        ),
        Some("duplicate") => println!(
            "{} is already marked present today",
            decision["name"].as_str().unwrap_or("?")
        ),
        Some("unknown") => println!("Face not recognized"),
        Some("error") => bail!("scan failed: {}", decision["reason"].as_str().unwrap_or("?")),
        _ => bail!("unexpected decision: {raw}"),
    }
    Ok(())
}

async fn enroll(proxy: &AttendanceProxy<'_>, name: &str, id: Option<String>) -> Result<()> {
    let identity =
        id.unwrap_or_else(|| format!("S{}", chrono::Local::now().timestamp_millis()));

    proxy.register_user(&identity, name).await?;
    match proxy.enroll_capture(&identity).await?.as_str() {
        "ok" => {}
        "busy" => bail!("daemon is busy with another scan or enrollment"),
        other => bail!("unexpected enroll response: {other}"),
    }
    println!("Enrolling {name} as {identity}; look at the camera");
    println!("Run `rollcall train` once capture finishes");
    Ok(())
}

async fn train(proxy: &AttendanceProxy<'_>, no_wait: bool) -> Result<()> {
    match proxy.start_training().await?.as_str() {
        "started" => println!("Training started"),
        "already_running" => println!("Training already running"),
        other => bail!("unexpected training response: {other}"),
    }
    if no_wait {
        return Ok(());
    }

    let mut last = String::new();
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let raw = proxy.train_status().await?;
        let status: serde_json::Value = serde_json::from_str(&raw)?;
        let message = status["message"].as_str().unwrap_or("").to_string();
        if message != last {
            println!(
                "[{:>3}%] {message}",
                status["progress"].as_u64().unwrap_or(0)
            );
            last = message;
        }
        if !status["running"].as_bool().unwrap_or(false) {
            return Ok(());
        }
    }
}

async fn recent(proxy: &AttendanceProxy<'_>, limit: u32) -> Result<()> {
    let raw = proxy.recent_attendance(limit).await?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    if rows.is_empty() {
        println!("No attendance records");
        return Ok(());
    }
    for row in rows {
        println!(
            "{}  {}  {}",
            row["day"].as_str().unwrap_or("?"),
            row["identity"].as_str().unwrap_or("?"),
            row["timestamp"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}
