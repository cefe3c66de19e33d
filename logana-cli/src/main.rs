use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use logana::{
    metrics::ScanStats, LogicMode, Match, ScanCompletion, ScanStatus, ScannerConfig, SearchEvent,
    SearchOptions, SearchSession,
};
use serde_json::json;
use std::{num::NonZeroUsize, path::PathBuf, process::ExitCode, sync::Arc};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Logic {
    And,
    Or,
}

impl From<Logic> for LogicMode {
    fn from(logic: Logic) -> Self {
        match logic {
            Logic::And => LogicMode::And,
            Logic::Or => LogicMode::Or,
        }
    }
}

#[derive(Parser)]
struct CliSearchArgs {
    /// Log file to scan
    file: PathBuf,

    /// Search terms, separated by whitespace
    query: String,

    /// Treat every term as a regular expression
    #[arg(short = 'r', long)]
    regex: bool,

    /// Match without regard to case
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Report lines that do not match the query
    #[arg(short = 'v', long)]
    invert: bool,

    /// How terms combine
    #[arg(long, value_enum, default_value = "and")]
    logic: Logic,

    /// Lines of context before and after each match
    #[arg(short = 'C', long, default_value = "0")]
    context: usize,

    /// Stop after roughly this many matches (0 for the default of 100000)
    #[arg(short = 'm', long, default_value = "0")]
    max_results: i64,

    /// Number of chunks scanned at once
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Count lines so matches carry line numbers
    #[arg(short = 'n', long)]
    line_numbers: bool,

    /// Memory-map the file
    #[arg(long)]
    mmap: bool,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Print scan statistics after the results
    #[arg(short, long)]
    stats: bool,

    /// Additional configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a log file
    Search(Box<CliSearchArgs>),

    /// Show the size and name of a file
    Info {
        /// File to inspect
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => run_search(*args),
        Commands::Info { file, json } => {
            let info = logana::file_info(&file)?;
            if json {
                println!("{}", serde_json::to_string(&info)?);
            } else {
                println!("{} ({} bytes)", info.name.blue(), info.size);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_search(args: CliSearchArgs) -> Result<ExitCode> {
    let mut config = ScannerConfig::load_from(args.config.as_deref())?;
    if let Some(threads) = args.threads {
        config.worker_count = threads;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.line_numbers |= args.line_numbers;
    config.use_mmap |= args.mmap;
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    let options = SearchOptions {
        file_path: args.file,
        query: args.query,
        is_regex: args.regex,
        ignore_case: args.ignore_case,
        invert: args.invert,
        logic: args.logic.into(),
        context: args.context,
        max_results: args.max_results,
    };

    let session = Arc::new(SearchSession::new(config)?);
    let handle = Arc::clone(&session);
    ctrlc::set_handler(move || handle.cancel()).context("failed to install Ctrl-C handler")?;

    let progress = if args.json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}%")?
                .progress_chars("=>-"),
        );
        bar
    };

    let mut matches: Vec<Match> = Vec::new();
    let completion = session.search(&options, |event| {
        if args.json {
            print_event(&event);
            return;
        }
        match event {
            SearchEvent::Progress(percent) => {
                progress.set_position(progress.position().max(percent as u64));
            }
            SearchEvent::Results(batch) => matches.extend(batch),
            SearchEvent::Complete(_) => progress.finish_and_clear(),
        }
    });

    let stats = session.metrics().get_stats();
    if args.json {
        if args.stats {
            println!("{}", json!({ "event": "scan_stats", "data": stats }));
        }
    } else {
        matches.sort_by_key(|m| m.offset);
        print_matches(&matches, options.context > 0);
        print_summary(&completion, matches.len());
        if args.stats {
            print_stats(&stats);
        }
    }

    Ok(match completion.status {
        ScanStatus::Complete => ExitCode::SUCCESS,
        ScanStatus::Cancelled => {
            eprintln!("{}", "Search cancelled".yellow());
            ExitCode::from(130)
        }
        ScanStatus::Error => {
            eprintln!("{} {}", "error:".red().bold(), completion.error);
            ExitCode::FAILURE
        }
    })
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_event(event: &SearchEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("failed to encode event: {}", e),
    }
}

fn print_matches(matches: &[Match], separate: bool) {
    for (i, m) in matches.iter().enumerate() {
        if separate && i > 0 {
            println!("{}", "--".dimmed());
        }
        let header = if m.line_number > 0 {
            format!("{}:{}", m.line_number, m.offset)
        } else {
            format!("@{}", m.offset)
        };
        println!("{}", header.green());
        for line in m.lines() {
            println!("{}", line);
        }
    }
}

fn print_summary(completion: &ScanCompletion, found: usize) {
    if completion.status == ScanStatus::Error {
        return;
    }
    println!(
        "\nFound {} matches in {:.2}s",
        found.to_string().bold(),
        completion.elapsed
    );
}

fn print_stats(stats: &ScanStats) {
    println!(
        "Chunks: {} total, {} scanned, {} without lines, {} capped, {} lost",
        stats.chunks_total,
        stats.chunks_completed,
        stats.chunks_empty,
        stats.chunks_capped,
        stats.chunks_lost()
    );
    println!(
        "Scanned {} bytes in {} lines",
        stats.bytes_scanned, stats.lines_scanned
    );
}
