#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dashgrid::DeviceClass;

use crate::commands::{run_compact, run_export, run_import, run_reset, run_validate, run_widgets};
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(
    name = "dashgrid",
    about = "Inspect and maintain dashgrid dashboard layouts",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a layout file against the built-in widget types.
    Validate(ValidateArgs),

    /// Print the stored layout as clipboard text. An empty store is seeded
    /// with the default layout first.
    Export(StoreArgs),

    /// Replace the stored layout with clipboard text from a file.
    Import(ImportArgs),

    /// Restore the default layout in a store.
    Reset(StoreArgs),

    /// Run gravity compaction over a layout file and print the result.
    Compact(CompactArgs),

    /// List the built-in widget types and their size bounds.
    Widgets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DeviceArg {
    #[default]
    Desktop,
    Mobile,
}

impl From<DeviceArg> for DeviceClass {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Desktop => Self::Desktop,
            DeviceArg::Mobile => Self::Mobile,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    pub file: PathBuf,

    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Directory holding the file-backed store.
    #[arg(long)]
    pub store: PathBuf,

    /// Dashboard configuration (`.toml` or `.json`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DeviceArg::Desktop)]
    pub device: DeviceArg,
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// File containing clipboard text (object or legacy array).
    pub file: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct CompactArgs {
    pub file: PathBuf,

    /// Only move widgets up, as after a resize.
    #[arg(long)]
    pub vertical: bool,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Validate(args) => run_validate(&args, out),
        Commands::Export(args) => run_export(&args, out),
        Commands::Import(args) => run_import(&args, out),
        Commands::Reset(args) => run_reset(&args, out),
        Commands::Compact(args) => run_compact(&args, out),
        Commands::Widgets => run_widgets(out),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, DeviceArg};

    #[test]
    fn import_takes_store_and_file() {
        let cli = Cli::parse_from(["dashgrid", "import", "--store", "/tmp/s", "paste.json"]);
        let Commands::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.store.store.to_str(), Some("/tmp/s"));
        assert_eq!(args.store.device, DeviceArg::Desktop);
        assert_eq!(args.file.to_str(), Some("paste.json"));
    }

    #[test]
    fn compact_vertical_flag() {
        let cli = Cli::parse_from(["dashgrid", "compact", "layout.json", "--vertical"]);
        assert!(matches!(cli.command, Commands::Compact(ref args) if args.vertical));
    }

    #[test]
    fn device_is_parsed_by_name() {
        let cli = Cli::parse_from(["dashgrid", "export", "--store", "s", "--device", "mobile"]);
        assert!(matches!(cli.command, Commands::Export(ref args) if args.device == DeviceArg::Mobile));
    }

    #[test]
    fn store_is_required() {
        assert!(Cli::try_parse_from(["dashgrid", "reset"]).is_err());
    }
}
