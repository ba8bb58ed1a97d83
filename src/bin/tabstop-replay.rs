use clap::Parser;
use frame_relay::{
    config::{self, FrameRelayConfig},
    page::{DocumentSpec, SimulatedPage},
    Error, FrameResult, ScanSession,
};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Replay keyboard navigation against a simulated frame tree", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "frame-relay.json")]
    config: PathBuf,

    /// Scenario describing the page and the focus/key steps to replay
    #[arg(short, long)]
    scenario: PathBuf,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    page: DocumentSpec,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    Focus {
        #[serde(default)]
        frame_path: Vec<String>,
        selector: String,
    },
    Key {
        #[serde(default)]
        frame_path: Vec<String>,
        key: String,
    },
    Wait {
        ms: u64,
    },
}

async fn replay(session: &ScanSession, step: &Step) -> FrameResult<()> {
    match step {
        Step::Focus { frame_path, selector } => {
            let document = document_at(session, frame_path)?;
            let element = document
                .element_by_selector(selector)
                .ok_or_else(|| Error::internal(format!("No element matches {}", selector)))?;
            document.focus(element).await;
        }
        Step::Key { frame_path, key } => {
            document_at(session, frame_path)?.press_key(key).await;
        }
        Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}

fn document_at(
    session: &ScanSession,
    frame_path: &[String],
) -> FrameResult<std::sync::Arc<frame_relay::page::SimulatedDocument>> {
    session
        .page()
        .resolve(frame_path)
        .and_then(|context| session.page().document(context))
        .ok_or_else(|| Error::internal(format!("No live frame at {:?}", frame_path)))
}

async fn run(cli: &Cli) -> FrameResult<()> {
    let config: FrameRelayConfig = if cli.config.exists() {
        config::from_file(&cli.config)?
    } else {
        FrameRelayConfig::default()
    };
    info!("config loaded.");
    debug!("config: {:?}", config);

    let scenario: Scenario = config::from_file(&cli.scenario)?;
    let session = ScanSession::new(SimulatedPage::from_spec(&scenario.page), config)?;
    let top = session.top()?;

    if let Err(e) = top.initialize_frames().await {
        warn!("Some frames could not be pinged: {}", e);
    }

    top.start_tab_stops().await?;
    for step in &scenario.steps {
        debug!("Replaying {:?}", step);
        replay(&session, step).await?;
    }
    top.stop_tab_stops().await?;

    let results = top.collected_tab_stop_results().await;
    let output = serde_json::to_string_pretty(&results)?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
