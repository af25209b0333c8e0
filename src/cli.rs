//! Command-line interface for the `volunteer-tracker` binary.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::error::Result;
use crate::export;
use crate::logging::Verbosity;
use crate::storage::{MemStorage, Storage};
use crate::workbook;

/// volunteer-tracker - Log volunteer hours and keep a spreadsheet in step
#[derive(Debug, Parser)]
#[command(name = "volunteer-tracker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web server
    Serve(ServeArgs),

    /// Write all stored events to a file
    Export(ExportArgs),
}

/// Overrides for `serve`.
#[derive(Debug, Default, Clone, Args)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Snapshot file
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Directory holding the built web client
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Keep everything in memory
    #[arg(long)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

/// Options for `export`.
#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Snapshot file to read instead of the configured one
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

impl ServeArgs {
    /// Apply the flags on top of loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(data) = &self.data {
            config.storage.data_path.clone_from(data);
        }
        if let Some(dir) = &self.static_dir {
            config.server.static_dir.clone_from(dir);
        }
        if self.in_memory {
            config.storage.persist = false;
        }
    }
}

/// Render the stored data in `format`.
///
/// # Errors
/// * Returns an error if the store cannot be read or the XLSX build fails
pub fn render_export(store: &dyn Storage, format: ExportFormat) -> Result<Vec<u8>> {
    let volunteers = store.volunteers()?;
    let events = store.events()?;
    match format {
        ExportFormat::Csv => Ok(export::to_csv(&volunteers, &events).into_bytes()),
        ExportFormat::Xlsx => export::to_xlsx(&workbook::build(&volunteers, &events)),
    }
}

/// Run `export`: read the snapshot and write the file.
///
/// # Errors
/// * Returns an error if the snapshot cannot be read or the file written
pub fn run_export(config: &Config, args: &ExportArgs) -> Result<()> {
    let data: &Path = args.data.as_deref().unwrap_or(&config.storage.data_path);
    let store = MemStorage::open(data)?;
    let bytes = render_export(&store, args.format)?;
    std::fs::write(&args.out, bytes)?;
    tracing::info!(out = %args.out.display(), format = ?args.format, "export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "volunteer-tracker");
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["volunteer-tracker", "-vv"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "volunteer-tracker",
            "serve",
            "--port",
            "8080",
            "--in-memory",
        ])
        .unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.data_path().is_none());
    }

    #[test]
    fn test_export_format_flag() {
        let cli =
            Cli::try_parse_from(["volunteer-tracker", "export", "-f", "xlsx", "-o", "out.xlsx"])
                .unwrap();
        let Some(Command::Export(args)) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.format, ExportFormat::Xlsx);
    }

    #[test]
    fn test_render_csv_of_empty_store() {
        let store = MemStorage::new();
        let bytes = render_export(&store, ExportFormat::Csv).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Volunteer ID,Volunteer Name,Date,Event,Location,Hours\n"
        );
    }

    #[test]
    fn test_run_export_reads_snapshot_and_writes_file() {
        use crate::model::{NewEvent, NewVolunteer};

        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.bin.gz");
        {
            let store = MemStorage::open(&data).unwrap();
            let ada = store
                .create_volunteer(NewVolunteer {
                    name: "Ada".into(),
                    email: None,
                    hour_goal: None,
                })
                .unwrap();
            store
                .create_event(NewEvent {
                    volunteer_id: ada.id,
                    event: "Pantry".into(),
                    location: "Hall".into(),
                    hours: "1:30".into(),
                    date: "2024-01-02".into(),
                })
                .unwrap();
        }

        let out = dir.path().join("events.csv");
        let args = ExportArgs {
            format: ExportFormat::Csv,
            out: out.clone(),
            data: Some(data),
        };
        run_export(&Config::default(), &args).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("1,Ada,2024-01-02,Pantry,Hall,1:30"));
    }
}
