// Subway arrivals server and terminal board

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use subway_board::board::{BoardRenderer, TextSink};
use subway_board::config::{Config, LayoutBackend, Settings};
use subway_board::error::ConfigError;
use subway_board::layout::{FileLayoutStore, LayoutStore, MemoryLayoutStore};
use subway_board::scheduler::RefreshScheduler;
use subway_board::server::{AppState, run_server};
use subway_board::service::ArrivalService;
use subway_board::source::{ApiSource, ArrivalSource, FeedSource};
use subway_board::store::ArrivalStore;

#[derive(Parser, Debug)]
#[command(name = "subway-board", version, about = "Real-time subway arrivals for a single stop")]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(long, short, env = "SUBWAY_BOARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Serve the arrivals API, polling the feed in the background
    Serve,
    /// Draw the countdown board on stdout until interrupted
    Board,
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            Config::load(path)?.resolve()
        }
        None => Settings::defaults(),
    }
}

fn create_source(settings: &Settings, use_api: bool) -> subway_board::error::Result<Arc<dyn ArrivalSource>> {
    match (&settings.board.api_url, use_api) {
        (Some(url), true) => {
            info!(url = %url, "Reading arrivals from API");
            Ok(Arc::new(ApiSource::new(url.clone(), settings.feed.request_timeout, settings.board.per_line_cap)?))
        }
        _ => {
            info!(url = %settings.feed.url, stop_id = %settings.feed.stop_id, "Reading arrivals from GTFS-RT feed");
            Ok(Arc::new(FeedSource::new(&settings.feed, settings.board.per_line_cap)?))
        }
    }
}

fn create_layout_store(settings: &Settings) -> Arc<dyn LayoutStore> {
    match settings.server.layout_store {
        LayoutBackend::Memory => Arc::new(MemoryLayoutStore::new()),
        LayoutBackend::File => {
            let dir = settings
                .server
                .layout_path
                .clone()
                .unwrap_or_else(FileLayoutStore::default_dir);
            info!(dir = %dir.display(), "Persisting dashboard layout to disk");
            Arc::new(FileLayoutStore::new(dir))
        }
    }
}

async fn serve(settings: Settings) -> std::io::Result<()> {
    let source = create_source(&settings, false).map_err(std::io::Error::other)?;
    let service = Arc::new(ArrivalService::new(
        source,
        Arc::new(ArrivalStore::new()),
        settings.board.poll_interval,
    ));

    let scheduler = RefreshScheduler::new(settings.board.render_interval);
    let polling = scheduler.start_polling(service.clone());
    info!(interval_ms = settings.board.poll_interval.as_millis() as u64, "Background polling started");

    let state = AppState {
        service,
        layout: create_layout_store(&settings),
        station: settings.board.station.clone(),
    };
    let result = run_server(state, &settings.server.bind, settings.server.port).await;

    polling.shutdown().await;
    result
}

async fn board(settings: Settings) -> std::io::Result<()> {
    let source = create_source(&settings, true).map_err(std::io::Error::other)?;
    let service = Arc::new(ArrivalService::new(
        source,
        Arc::new(ArrivalStore::new()),
        settings.board.poll_interval,
    ));
    let renderer = BoardRenderer::new(&settings.board, &settings.feed.lines);

    let scheduler = RefreshScheduler::new(settings.board.render_interval);
    let handle = scheduler.start(service, renderer, TextSink::new(std::io::stdout()));

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping board");
    handle.shutdown().await;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings = match load_settings(args.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let result = actix_web::rt::System::new().block_on(async move {
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => serve(settings).await,
            Command::Board => board(settings).await,
        }
    });

    if let Err(e) = result {
        error!(error = %e, "Exited with error");
        std::process::exit(1);
    }
}
