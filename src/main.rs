use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use protest_risk::api::{router, ApiState};
use protest_risk::config::Config;
use protest_risk::db::SegmentStore;
use protest_risk::error::{AppError, Result};
use protest_risk::pipeline;
use protest_risk::query::aggregate_table;
use protest_risk::snapshot::{Snapshot, SnapshotHandle};

enum Command {
    Build,
    Serve,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("serve") => Ok(Command::Serve),
            Some("build") => Ok(Command::Build),
            Some(other) => Err(AppError::Config(format!(
                "unknown command {other:?}, expected `build` or `serve`"
            ))),
        }
    }
}

#[tokio::main]
async fn main() {
    let arg = std::env::args().nth(1);
    let parsed = Config::from_env().and_then(|cfg| Ok((cfg, Command::parse(arg.as_deref())?)));
    let (cfg, command) = match parsed {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let outcome = match command {
        Command::Build => build(cfg).await,
        Command::Serve => serve(cfg).await,
    };
    if let Err(e) = outcome {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn build(cfg: Config) -> Result<()> {
    let store = SegmentStore::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let report = pipeline::run(&cfg, &store).await?;
    info!(
        opportunities = report.opportunities,
        segments = report.segments,
        "Build finished, artifacts in {}",
        cfg.artifacts_dir.display()
    );
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let store = SegmentStore::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let snapshot = Snapshot::load(&cfg)?;
    let segments = aggregate_table(&snapshot.base);
    store.replace_all(&segments, chrono::Utc::now().timestamp()).await?;
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let app = router(ApiState::new(cfg, SnapshotHandle::new(snapshot), store));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
