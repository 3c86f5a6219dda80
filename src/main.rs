//! Entry point orchestration: parses the CLI, opens the point database,
//! loads sector metadata, and launches one sector runner per sector on its
//! own thread.
//!
//! Grounded on `original_source/cpp/src/route_finder.cpp`'s `main`.

use std::sync::{Arc, Mutex};

use clap::Parser;

use polytrace::config::{Cli, RunConfig};
use polytrace::db::{PointDatabase, SqlitePointDatabase};
use polytrace::projection::{Projector, UtmProjector};
use polytrace::result_sink::{CsvKmlResultSink, ResultSink};
use polytrace::stats::StatsAggregator;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let run_config = match RunConfig::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("{}", err);
            eprintln!("usage error: {}", err);
            std::process::exit(1);
        }
    };

    match run(run_config) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            log::error!("unrecoverable error: {}", err);
            std::process::exit(2);
        }
    }
}

fn run(run_config: RunConfig) -> polytrace::error::Result<()> {
    let db = SqlitePointDatabase::open(
        run_config
            .database_path
            .to_str()
            .expect("database path must be valid UTF-8"),
    )?;

    let mut sectors = db.load_sectors()?;
    if let Some(filter) = &run_config.sector_filter {
        sectors.retain(|sector| &sector.name == filter);
    }
    log::info!("loaded {} sector(s)", sectors.len());

    let projector = UtmProjector::new(run_config.epsg_code)?;
    let projector: Arc<dyn Projector> = Arc::new(projector);

    let stats = Arc::new(StatsAggregator::new());
    stats.start_writer(run_config.stats_path.clone());

    let result_sink: Arc<Mutex<dyn ResultSink + Send>> =
        Arc::new(Mutex::new(CsvKmlResultSink::new("waypoints.csv", "waypoints.kml")));

    let run_config = Arc::new(run_config);
    let db_path = run_config.database_path.clone();

    let mut handles = Vec::new();
    for sector in sectors {
        let run_config = Arc::clone(&run_config);
        let projector = Arc::clone(&projector);
        let stats = Arc::clone(&stats);
        let result_sink = Arc::clone(&result_sink);
        let db_path = db_path.clone();

        let handle = std::thread::spawn(move || {
            let db = match SqlitePointDatabase::open(db_path.to_str().expect("valid UTF-8 path")) {
                Ok(db) => db,
                Err(err) => {
                    log::error!("sector {}: failed to open database in worker thread: {}", sector.name, err);
                    return;
                }
            };
            if let Err(err) = polytrace::sector_runner::run(
                &db,
                &sector,
                run_config.as_ref(),
                projector.as_ref(),
                &stats,
                &result_sink,
            ) {
                log::error!("sector {}: terminated early: {}", sector.name, err);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }

    stats.stop_writer();
    if let Err(err) = stats.flush(&run_config.stats_path, true) {
        log::error!("final stats flush failed: {}", err);
    }

    log::info!("all sector tasks finished");
    Ok(())
}
