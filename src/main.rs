use std::cell::RefCell;
use std::path::Path;
use std::process::exit;
use std::rc::Rc;

use log::{error, info};

use uglc_cli::cli::CliArgs;
use uglc_cli::config::UglcConfig;
use uglc_cli::driver::{Driver, DriverMode, SummaryConsumer};
use uglc_cli::error::Result;
use uglc_cli::geometry::Geometry;
use uglc_cli::ingest;

fn run(args: &CliArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => UglcConfig::load(Path::new(path))?,
        None => UglcConfig::default(),
    };
    let geometry = Geometry::from_config(&config.geometry);

    let frames = ingest::read_frames(&args.files)?;
    info!(
        "loaded {} frames from {} files",
        frames.len(),
        args.files.len()
    );

    let mode = match args.mode {
        0 => DriverMode::Isolated,
        _ => DriverMode::Joined,
    };
    let consumer = Rc::new(RefCell::new(SummaryConsumer));
    let driver = Driver::new(consumer, mode, args.gap);
    driver.process_frames(frames, &config, &geometry)
}

fn main() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    pretty_env_logger::formatted_builder()
        .parse_filters(&level)
        .init();

    let args = CliArgs::do_parse();
    match run(&args) {
        Ok(()) => info!("done processing"),
        Err(e) => crash_with_message(e.to_string()),
    }
}

fn crash_with_message(msg: String) {
    error!("An error occurred. {}", msg);
    exit(-1);
}
