use anyhow::Result;
use anyhow::anyhow;
use ftail::Ftail;
use log::LevelFilter;
use log::info;
use std::env;
use std::fs;

const LOGS_DIR: &str = ".logs";
const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Console gets warnings (debug with `verbose`), the log file gets info and up.
pub fn init_logger(verbose: bool) -> Result<()> {
    let home_folder = env::home_dir().ok_or_else(|| anyhow!("Could not determine $HOME"))?;

    let logs_path = home_folder.join(LOGS_DIR).join(PKG_NAME);
    let logs_file = logs_path.join(format!("{PKG_NAME}.log"));

    fs::create_dir_all(&logs_path)
        .map_err(|e| anyhow!("Could not create logs dir at {}: {}", logs_path.display(), e))?;

    let console_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    Ftail::new()
        .console(console_level)
        .single_file(&logs_file, true, LevelFilter::Info)
        .init()
        .map_err(|e| anyhow!("Could not initialize logger: {}", e))?;

    info!("Logger initialized.");
    Ok(())
}
