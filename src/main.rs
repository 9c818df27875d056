use anyhow::{Context, Result};
use heron::{
    cli::{Command, CommandLineArgs, GlobalArgs},
    scanner,
    session::SessionLimits,
};
use tokio::runtime::Builder;
use tracing_core::metadata::LevelFilter;
use tracing_subscriber::{fmt, prelude::__tracing_subscriber_SubscriberExt, registry, util::SubscriberInitExt};

fn main() -> Result<()> {
    let args = CommandLineArgs::parse_args();
    setup_logging(&args.global_args);

    // Size the runtime to the analysis worker count; signature commands get a
    // machine default.
    let num_threads = match args.command {
        Command::Scan(ref scan_args) => {
            SessionLimits::new(
                scan_args.max_file_size,
                scan_args.commit_depth,
                scan_args.num_threads,
                scan_args.match_level,
            )
            .num_threads
        }
        Command::Signatures(_) => num_cpus::get().max(1),
    };

    let runtime = Builder::new_multi_thread()
        .worker_threads(num_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    runtime.block_on(async_main(args))
}

fn setup_logging(global_args: &GlobalArgs) {
    let (level, all_targets) = if global_args.quiet {
        (LevelFilter::ERROR, false)
    } else {
        let level = match global_args.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        (level, global_args.verbose > 2)
    };
    let filter = if all_targets {
        tracing_subscriber::filter::Targets::new().with_default(LevelFilter::TRACE)
    } else {
        tracing_subscriber::filter::Targets::new()
            .with_default(LevelFilter::ERROR)
            .with_target("heron", level)
    };
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .without_time();
    registry().with(fmt_layer).with(filter).init();
}

async fn async_main(args: CommandLineArgs) -> Result<()> {
    match args.command {
        Command::Scan(ref scan_args) => scanner::run_scan(&args.global_args, scan_args).await,
        Command::Signatures(ref sig_args) => scanner::run_signatures_command(sig_args),
    }
}
