use clap::Parser;
use std::path::PathBuf;

/// Analyze a CAD script project the way the launcher would load it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Project directory or single script file
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Enable debug logging to file (default: cadrun.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Settings file (default: cadrun.json in the config directory)
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["cadrun", "proj", "-vv", "--log", "-c", "/tmp/cfg"]);
        assert_eq!(args.project, PathBuf::from("proj"));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
        assert_eq!(args.config_dir, Some(PathBuf::from("/tmp/cfg")));
        assert!(args.settings.is_none());
    }

    #[test]
    fn test_log_with_file() {
        let args = Args::parse_from(["cadrun", "--log=run.log", "proj"]);
        assert_eq!(args.log_file, Some(Some(PathBuf::from("run.log"))));
    }
}
