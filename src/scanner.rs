//! Scan orchestration: session construction, validation, target resolution,
//! analysis, reporting, and the trailing serve state.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use tracing::{info, trace, warn};

use crate::{
    analyzer,
    cli::{commands::scan::ScanArgs, GlobalArgs},
    findings::FindingsStore,
    github::GitHubClient,
    reporter::{self, ReportFormat},
    resolver::{self, ResolutionStrategy},
    server,
    session::{ScanSession, SessionLimits, TargetSpec},
    signatures::SignatureSet,
};

pub async fn run_scan(global_args: &GlobalArgs, args: &ScanArgs) -> Result<()> {
    let mut session = build_session(args)?;
    trace!("Session:\n{session:#?}");

    let signatures = match &args.signature_file {
        Some(path) => SignatureSet::from_file(path, session.limits.match_level)?,
        None => SignatureSet::builtin(session.limits.match_level)?,
    };

    info!(
        "{} v{} started at {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        session.started_at().to_rfc3339()
    );
    info!("Loaded {} signatures", signatures.len());

    let client = GitHubClient::new(session.api_url.clone(), session.token().map(str::to_string))?;

    let progress = if global_args.use_progress() {
        let style = ProgressStyle::with_template("{spinner} {msg} {pos} [{elapsed_precise}]")
            .expect("progress bar style template should compile");
        let pb = ProgressBar::new_spinner()
            .with_style(style)
            .with_message("Enumerating repositories...");
        pb.enable_steady_tick(Duration::from_millis(500));
        pb
    } else {
        ProgressBar::hidden()
    };
    let outcome = resolver::resolve_targets(&client, &mut session, Some(&progress)).await?;
    progress.finish_with_message(format!(
        "Found {} repositories",
        HumanCount(outcome.discovered as u64)
    ));
    if !outcome.skipped.is_empty() {
        warn!("{} targets could not be resolved", outcome.skipped.len());
    }

    if args.list_only {
        for repo in session.resolved_repositories() {
            println!("{repo}");
        }
        return Ok(());
    }

    let datastore = Arc::new(Mutex::new(FindingsStore::new()));
    analyzer::analyze_repositories(
        &mut session,
        Arc::new(signatures),
        Arc::clone(&datastore),
        global_args.use_progress(),
    )
    .await?;

    session.finish();

    let format = if args.json { ReportFormat::Json } else { ReportFormat::Pretty };
    let styles = reporter::Styles::new(global_args.use_color(std::io::stdout()));
    reporter::print_session_report(
        &session,
        &datastore,
        &outcome.skipped,
        format,
        args.hide_secrets,
        &styles,
    );

    // The batch is done; keep the status endpoint up until interrupted.
    // --silent suppresses the messaging only.
    let snapshot = session.stats.snapshot();
    server::idle_serve(
        &session.bind_address,
        session.bind_port,
        snapshot,
        session.silent,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;
    Ok(())
}

/// Construct and validate a session from the CLI arguments. Fails on a
/// policy-level target specification error before any network activity.
pub fn build_session(args: &ScanArgs) -> Result<ScanSession> {
    let limits = SessionLimits::new(
        args.max_file_size,
        args.commit_depth,
        args.num_threads,
        args.match_level,
    );
    // `Url::join` resolves relative to the last slash, so a base like
    // `/api/v3` would silently drop its final segment on every request.
    let mut api_url = args.api_url.clone();
    if !api_url.path().ends_with('/') {
        api_url.set_path(&format!("{}/", api_url.path()));
    }
    let targets =
        TargetSpec::new(args.user.clone(), args.organization.clone(), args.repository.clone());
    let mut session = ScanSession::new(
        api_url,
        args.bind_address.clone(),
        args.bind_port,
        limits,
        targets,
        args.silent,
        args.scan_forks,
    );

    if let ResolutionStrategy::Invalid(e) = resolver::classify(&session.targets) {
        bail!(e);
    }
    session.resolve_credential(args.api_token.as_deref());
    session.mark_validated();
    Ok(session)
}

/// `heron signatures list` / `heron signatures check`
pub fn run_signatures_command(
    args: &crate::cli::commands::signatures::SignaturesArgs,
) -> Result<()> {
    use crate::cli::commands::signatures::SignaturesCommand;

    let load = || -> Result<SignatureSet> {
        match &args.signature_file {
            Some(path) => SignatureSet::from_file(path, args.match_level),
            None => SignatureSet::builtin(args.match_level),
        }
    };
    match args.command {
        SignaturesCommand::List => {
            let set = load()?;
            let name_width = set.iter().map(|s| s.name().len()).max().unwrap_or(4);
            println!("{: <name_width$}  {: <9}  Level", "Name", "Part");
            for signature in set.iter() {
                println!(
                    "{: <name_width$}  {: <9}  {}",
                    signature.name(),
                    format!("{:?}", signature.syntax.part).to_lowercase(),
                    signature.syntax.level
                );
            }
        }
        SignaturesCommand::Check => {
            let set = load().context("Signature check failed")?;
            println!("{} signatures loaded and compiled successfully", set.len());
        }
    }
    Ok(())
}
