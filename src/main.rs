use anyhow::Result;
use env_logger::Env;

use vesper::cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    cli::run()
}
