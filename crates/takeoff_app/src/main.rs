mod app;
mod commands;
mod config;
mod effects;
mod logging;
mod persistence;
mod render;

use clap::Parser;
use log::LevelFilter;

fn main() -> anyhow::Result<()> {
    let config = config::Config::parse();
    let level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(config.log, level);
    app::run(config)
}
