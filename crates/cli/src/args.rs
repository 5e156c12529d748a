use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "dominds", about = "Dialog orchestration runtime server")]
pub struct CliArgs {
    /// Workspace root the event store's on-disk layout is rooted at.
    /// Defaults to the current directory.
    #[arg(short = 'C', long = "chdir")]
    pub workspace_root: Option<PathBuf>,

    /// Path to the TOML config file. Missing is not an error.
    #[arg(long, default_value = "dominds.toml")]
    pub config: PathBuf,

    #[arg(short = 'H', long)]
    pub host: Option<String>,

    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    #[arg(long, value_enum)]
    pub mode: Option<CliMode>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliMode {
    Dev,
    Prod,
}

impl From<CliMode> for dominds_core::config::ConfiguredMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Dev => dominds_core::config::ConfiguredMode::Dev,
            CliMode::Prod => dominds_core::config::ConfiguredMode::Prod,
        }
    }
}
