//! tvscan-cli: run channel scans and inspect the stored channel list.
//!
//! Scans run against the replay backend, which serves a directory of
//! captured transport streams named `<frequency>.ts`.

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use tvscan::database::Database;
use tvscan::scanner::ScanProgress;
use tvscan::{assemble, ReplayBackend, ScanBackend, ScanHandle, ScanStore};
use tvscan_protocol::{
    AtvMode, DtvMode, DtvStandard, EndCode, Polarisation, ScanError, ScanMode, SortMethod,
    SourceKind,
};

mod config;
mod logging;
mod output;

use config::{build_scan_config, default_database_path, find_config, load_config, ConfigFile};

/// tvscan-cli - channel scanner for DVB, ISDB, ATSC and analog TV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to ./tvscan.toml when present)
    #[arg(short = 'f', long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long, global = true)]
    log_retention_days: Option<u64>,

    /// Path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan for channels and store them.
    Scan(ScanArgs),

    /// Print the stored channel list.
    List {
        /// Only channels of this source.
        #[arg(value_enum, long, short = 's')]
        source: Option<SourceArg>,

        /// Print the scan history instead of the channels.
        #[arg(long)]
        history: bool,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory of captured transport streams.
    #[arg(long)]
    pub captures: Option<PathBuf>,

    /// Order of the analog and digital passes.
    #[arg(value_enum, long)]
    pub order: Option<OrderArg>,

    /// Digital source.
    #[arg(value_enum, long, short = 's')]
    pub source: Option<SourceArg>,

    /// Digital broadcast standard.
    #[arg(value_enum, long)]
    pub standard: Option<StandardArg>,

    /// Digital search mode.
    #[arg(value_enum, long, short = 'm')]
    pub mode: Option<DtvModeArg>,

    /// Digital frequency (Hz, kHz for satellite). Repeatable.
    #[arg(short = 'F', long)]
    pub frequency: Vec<u32>,

    /// Terrestrial channel bandwidth in MHz.
    #[arg(long, default_value = "8")]
    pub bandwidth_mhz: u32,

    /// Symbol rate for cable and satellite frequencies.
    #[arg(long)]
    pub symbol_rate: Option<u32>,

    /// Satellite polarisation.
    #[arg(value_enum, long)]
    pub polarisation: Option<PolarisationArg>,

    /// Analog search mode.
    #[arg(value_enum, long)]
    pub atv: Option<AtvModeArg>,

    /// Analog frequency (Hz). Step modes read min, max, start. Repeatable.
    #[arg(long)]
    pub atv_frequency: Vec<u32>,

    /// Default channel numbering.
    #[arg(value_enum, long)]
    pub sort: Option<SortArg>,

    /// Collect the BAT during NIT discovery.
    #[arg(long)]
    pub search_bat: bool,

    /// Renumber every stored channel.
    #[arg(long)]
    pub resort_all: bool,

    /// Do not write the result to the database.
    #[arg(long)]
    pub no_store: bool,

    /// Print JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderArg {
    AtvFirst,
    DtvFirst,
    Adtv,
}

impl From<OrderArg> for ScanMode {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::AtvFirst => ScanMode::AtvFirst,
            OrderArg::DtvFirst => ScanMode::DtvFirst,
            OrderArg::Adtv => ScanMode::Adtv,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Analog,
    Cable,
    Terrestrial,
    Satellite,
    Atsc,
}

impl From<SourceArg> for SourceKind {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Analog => SourceKind::Analog,
            SourceArg::Cable => SourceKind::Cable,
            SourceArg::Terrestrial => SourceKind::Terrestrial,
            SourceArg::Satellite => SourceKind::Satellite,
            SourceArg::Atsc => SourceKind::Atsc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StandardArg {
    Dvb,
    Isdb,
    Atsc,
}

impl From<StandardArg> for DtvStandard {
    fn from(value: StandardArg) -> Self {
        match value {
            StandardArg::Dvb => DtvStandard::Dvb,
            StandardArg::Isdb => DtvStandard::Isdb,
            StandardArg::Atsc => DtvStandard::Atsc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DtvModeArg {
    Manual,
    Auto,
    AllBand,
    Blind,
}

impl From<DtvModeArg> for DtvMode {
    fn from(value: DtvModeArg) -> Self {
        match value {
            DtvModeArg::Manual => DtvMode::Manual,
            DtvModeArg::Auto => DtvMode::Auto,
            DtvModeArg::AllBand => DtvMode::AllBand,
            DtvModeArg::Blind => DtvMode::Blind,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AtvModeArg {
    Fixed,
    Manual,
    Auto,
}

impl From<AtvModeArg> for AtvMode {
    fn from(value: AtvModeArg) -> Self {
        match value {
            AtvModeArg::Fixed => AtvMode::Fixed,
            AtvModeArg::Manual => AtvMode::Manual,
            AtvModeArg::Auto => AtvMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    ScanOrder,
    ServiceId,
    Lcn,
}

impl From<SortArg> for SortMethod {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::ScanOrder => SortMethod::ScanOrder,
            SortArg::ServiceId => SortMethod::ServiceId,
            SortArg::Lcn => SortMethod::Lcn,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolarisationArg {
    Horizontal,
    Vertical,
}

impl From<PolarisationArg> for Polarisation {
    fn from(value: PolarisationArg) -> Self {
        match value {
            PolarisationArg::Horizontal => Polarisation::Horizontal,
            PolarisationArg::Vertical => Polarisation::Vertical,
        }
    }
}

/// What the main thread waits for while a scan runs.
enum Signal {
    Finished(EndCode),
    Interrupted,
}

fn main() {
    let cli = Cli::parse();

    let config_path = find_config(cli.config.as_ref());
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                std::process::exit(1);
            }
        },
        None => ConfigFile::default(),
    };

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let log_retention_days = cli
        .log_retention_days
        .or(file_config.logging.retention_days)
        .unwrap_or(7);
    if let Err(e) = logging::init_logging(
        &log_dir,
        log_retention_days,
        cli.verbose,
        file_config.logging.level.as_deref(),
    ) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let db_path = cli
        .database
        .clone()
        .or_else(|| file_config.database.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_database_path);

    let code = match &cli.command {
        Command::Scan(args) => cmd_scan(args, &file_config, db_path),
        Command::List {
            source,
            history,
            json,
        } => cmd_list(db_path, source.map(SourceKind::from), *history, *json),
    };
    std::process::exit(code);
}

fn exit_code(err: &ScanError) -> i32 {
    i32::from(u16::from(err.code()))
}

fn cmd_scan(args: &ScanArgs, file_config: &ConfigFile, db_path: PathBuf) -> i32 {
    let scan_config = build_scan_config(file_config, args);

    let Some(captures) = args
        .captures
        .clone()
        .or_else(|| file_config.replay.dir.as_ref().map(PathBuf::from))
    else {
        error!("No capture directory given (--captures or [replay] dir)");
        return exit_code(&ScanError::InvalidParameter("no capture directory".into()));
    };
    let replay = match ReplayBackend::open(&captures) {
        Ok(replay) => replay,
        Err(e) => {
            error!("Failed to open captures: {}", e);
            return exit_code(&ScanError::from(e));
        }
    };
    let backend = ScanBackend {
        frontend: replay.clone(),
        demux: replay,
        decoder: Arc::new(tvscan::ts_analyzer::SiDecoder::new()),
    };

    let store: Option<Box<dyn ScanStore>> = if args.no_store {
        None
    } else {
        info!("Opening database: {}", db_path.display());
        match Database::open(&db_path) {
            Ok(db) => Some(Box::new(db)),
            Err(e) => {
                error!("Failed to open database: {}", e);
                return exit_code(&ScanError::from(e));
            }
        }
    };

    let (tx, rx) = mpsc::channel::<Signal>();

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_tx = Mutex::new(tx.clone());
    let progress_bar = bar.clone();
    let progress = Arc::new(move |event: &ScanProgress| match event {
        ScanProgress::TsBegin {
            index,
            total,
            params,
        } => {
            progress_bar.set_length(*total as u64);
            progress_bar.set_position(*index as u64);
            progress_bar.set_message(format!("tuning {}", params.frequency()));
        }
        ScanProgress::AtvTuning(frequency) => {
            progress_bar.set_message(format!("analog {}", frequency));
        }
        ScanProgress::BlindScan { percent, .. } => {
            progress_bar.set_message(format!("blind scan {}%", percent));
        }
        ScanProgress::Signal(signal) if signal.locked => {
            progress_bar.set_message(format!("locked {}", signal.frequency));
        }
        ScanProgress::NitBegin => progress_bar.set_message("searching NIT"),
        ScanProgress::StoreBegin => progress_bar.set_message("storing"),
        ScanProgress::ScanEnd(code) => {
            if let Ok(tx) = progress_tx.lock() {
                let _ = tx.send(Signal::Finished(*code));
            }
        }
        _ => {}
    });

    let interrupt_tx = Mutex::new(tx);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Ok(tx) = interrupt_tx.lock() {
            let _ = tx.send(Signal::Interrupted);
        }
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut handle = match ScanHandle::create(scan_config, backend, progress, store) {
        Ok(handle) => handle,
        Err(e) => {
            bar.finish_and_clear();
            error!("Failed to create scanner: {}", e);
            return exit_code(&e);
        }
    };
    if let Err(e) = handle.start() {
        bar.finish_and_clear();
        error!("Failed to start scanner: {}", e);
        return exit_code(&e);
    }

    let persist = match rx.recv() {
        Ok(Signal::Finished(code)) => {
            info!("Scan finished: {}", code);
            !args.no_store
        }
        Ok(Signal::Interrupted) => {
            warn!("Interrupted, stopping scan without storing");
            false
        }
        Err(_) => false,
    };

    let outcome = handle.destroy(persist);
    bar.finish_and_clear();
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Scan failed: {}", e);
            return exit_code(&e);
        }
    };

    if let Some(failure) = &outcome.result.failure {
        error!("Scan stopped: {}", failure);
    }

    let printed = match outcome.stored {
        Some(summary) => {
            info!(
                "Stored {} transponders, {} services",
                summary.transponders, summary.services
            );
            return cmd_list(db_path, None, false, args.json);
        }
        None => {
            let batch = assemble(&outcome.result);
            if args.json {
                output::print_json(&batch)
            } else {
                output::print_batch_table(&batch);
                Ok(())
            }
        }
    };
    if let Err(e) = printed {
        error!("Failed to print result: {}", e);
        return 1;
    }

    outcome.result.failure.as_ref().map_or(0, exit_code)
}

fn cmd_list(db_path: PathBuf, source: Option<SourceKind>, history: bool, json: bool) -> i32 {
    let db = match Database::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {}", db_path.display(), e);
            return exit_code(&ScanError::from(e));
        }
    };

    let printed = if history {
        db.scan_history(50).map(|entries| {
            if json {
                output::print_json(&entries)
            } else {
                output::print_history_table(&entries);
                Ok(())
            }
        })
    } else {
        db.channels(source).map(|channels| {
            if json {
                output::print_json(&channels)
            } else {
                output::print_channels_table(&channels);
                Ok(())
            }
        })
    };

    match printed {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!("Failed to print: {}", e);
            1
        }
        Err(e) => {
            error!("Database query failed: {}", e);
            exit_code(&ScanError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scan_flags() {
        let cli = Cli::parse_from([
            "tvscan-cli",
            "-v",
            "scan",
            "--captures",
            "/captures",
            "--source",
            "cable",
            "-F",
            "474000000",
            "-F",
            "482000000",
            "--sort",
            "lcn",
            "--no-store",
        ]);
        assert!(cli.verbose);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.frequency, vec![474_000_000, 482_000_000]);
        assert!(matches!(args.sort, Some(SortArg::Lcn)));
        assert!(args.no_store);
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::parse_from(["tvscan-cli", "list", "--source", "atsc", "--json"]);
        assert!(matches!(
            cli.command,
            Command::List {
                source: Some(SourceArg::Atsc),
                history: false,
                json: true
            }
        ));
    }

    #[test]
    fn test_exit_code_from_error() {
        assert_eq!(exit_code(&ScanError::InvalidParameter("x".into())), 2);
        assert_eq!(exit_code(&ScanError::Store("x".into())), 0x0A);
    }
}
