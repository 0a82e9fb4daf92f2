use colored::*;
use log::{Level, LevelFilter};
use std::fs;

/// Wire up the fern dispatcher: colored output on stdout plus a per-day
/// plain-text file under `log/<app_name>/`. `verbosity` follows the usual
/// 0 = errors only .. 4+ = trace mapping.
pub fn init_logger(app_name: impl AsRef<str>, verbosity: u64) -> Result<(), fern::InitError> {
    let log_root = format!("log/{}", app_name.as_ref());
    fs::create_dir_all(&log_root)?;

    let level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _4_or_more => LevelFilter::Trace,
    };

    let stdout_dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            let level = match record.level() {
                Level::Error => format!("{}", record.level()).red(),
                Level::Warn => format!("{}", record.level()).yellow(),
                Level::Info => format!("{}", record.level()).cyan(),
                Level::Debug => format!("{}", record.level()).purple(),
                Level::Trace => format!("{}", record.level()).normal(),
            };
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout());

    let file_dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(format!(
            "{}/{}.{}.log",
            log_root,
            app_name.as_ref(),
            chrono::Utc::now().format("%Y_%m_%d")
        ))?);

    fern::Dispatch::new()
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()?;

    Ok(())
}
