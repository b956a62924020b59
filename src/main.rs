use cadrun::cli::Args;
use cadrun::config::{self, PathConfig, Settings};
use cadrun::fs::{DirRegistrar, FsManager, JsonStateFile};
use cadrun::ingest::{EntryExtractor, PathExtractor};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("notify", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("notify", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| config::config_file(config::SETTINGS_FILE, &path_config));
    let settings = Settings::load(&settings_path)?;
    let state = JsonStateFile::open(config::data_file(config::STATE_FILE, &path_config));
    let mut fs = FsManager::new(settings, Box::new(state));

    let project = &args.project;
    if project.is_dir() {
        info!("Mounting project directory {}", project.display());
        fs.init_filesystem(&DirRegistrar::new(vec![project.clone()]))
            .with_context(|| format!("Failed to mount {}", project.display()))?;
    } else {
        info!("Loading single script {}", project.display());
        let files = PathExtractor.extract(std::slice::from_ref(project))?;
        fs.ingest_files(files)?;
    }

    let info = fs
        .analyze_project()
        .with_context(|| format!("Failed to analyze {}", project.display()))?;
    info!(
        "Project '{}': entry {:?}, {} files, {} aliases",
        info.project_name,
        info.entry,
        info.files.len(),
        info.alias.len()
    );
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
