use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::github::RepositoryRef;

/// Scan type tag carried through reports and logs.
pub const SCAN_TYPE_GITHUB_ENTERPRISE: &str = "github-enterprise";

/// The three optional target sets supplied at startup.
///
/// Each set is deduplicated and case-normalized at construction and never
/// mutated afterwards. The resolver reads them; nothing writes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSpec {
    pub logins: BTreeSet<String>,
    pub organizations: BTreeSet<String>,
    pub repositories: BTreeSet<String>,
}

impl TargetSpec {
    pub fn new<I, J, K>(logins: I, organizations: J, repositories: K) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
        K: IntoIterator<Item = String>,
    {
        Self {
            logins: normalize(logins),
            organizations: normalize(organizations),
            repositories: normalize(repositories),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.logins.is_empty() && self.organizations.is_empty() && self.repositories.is_empty()
    }
}

fn normalize<I: IntoIterator<Item = String>>(values: I) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Numeric limits handed down to the gatherers and the analysis engine.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Largest file to scan, in megabytes.
    pub max_file_size_mb: u64,
    /// Clone depth; 0 means full history.
    pub commit_depth: u32,
    /// Worker pool size; already clamped to at least 1.
    pub num_threads: usize,
    /// Keep signatures with level <= match_level.
    pub match_level: u8,
}

impl SessionLimits {
    pub fn new(max_file_size_mb: u64, commit_depth: u32, num_threads: usize, match_level: u8) -> Self {
        Self {
            max_file_size_mb,
            commit_depth,
            // 0 means "pick a default", never "unbounded"
            num_threads: if num_threads == 0 { num_cpus::get().max(1) } else { num_threads },
            match_level,
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// How the session authenticates against the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A token was supplied; private repositories are reachable.
    Token,
    /// No token; the scan proceeds against public entities only.
    Anonymous,
}

/// Session lifecycle. Transitions are linear and enforced by the methods on
/// [`ScanSession`]; `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Validated,
    Resolving,
    Analyzing,
    Finished,
}

/// Aggregate counters updated concurrently by analysis workers.
///
/// These are the only session fields written after validation completes, so
/// they live behind atomics rather than a lock.
#[derive(Debug, Default)]
pub struct ScanStats {
    repositories_scanned: AtomicU64,
    findings: AtomicU64,
    errors: AtomicU64,
    targets_skipped: AtomicU64,
}

impl ScanStats {
    pub fn add_repository_scanned(&self) {
        self.repositories_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_findings(&self, n: u64) {
        self.findings.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_target_skipped(&self) {
        self.targets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            repositories_scanned: self.repositories_scanned.load(Ordering::Relaxed),
            findings: self.findings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            targets_skipped: self.targets_skipped.load(Ordering::Relaxed),
        }
    }
}

/// A frozen view of the counters, used by the reporter and status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub repositories_scanned: u64,
    pub findings: u64,
    pub errors: u64,
    pub targets_skipped: u64,
}

/// Process-scoped state threaded through every stage of a scan.
///
/// The orchestrating task owns the session mutably during `Resolving`; during
/// `Analyzing` workers only touch the shared [`ScanStats`].
pub struct ScanSession {
    pub scan_type: &'static str,
    pub api_url: Url,
    token: Option<String>,
    pub auth_mode: AuthMode,
    pub bind_address: String,
    pub bind_port: u16,
    pub limits: SessionLimits,
    pub targets: TargetSpec,
    pub silent: bool,
    pub scan_forks: bool,

    state: SessionState,
    resolved: Vec<Arc<RepositoryRef>>,
    started_at: DateTime<Local>,
    finished_at: Option<DateTime<Local>>,
    pub stats: Arc<ScanStats>,
}

impl ScanSession {
    pub fn new(
        api_url: Url,
        bind_address: String,
        bind_port: u16,
        limits: SessionLimits,
        targets: TargetSpec,
        silent: bool,
        scan_forks: bool,
    ) -> Self {
        Self {
            scan_type: SCAN_TYPE_GITHUB_ENTERPRISE,
            api_url,
            token: None,
            auth_mode: AuthMode::Anonymous,
            bind_address,
            bind_port,
            limits,
            targets,
            silent,
            scan_forks,
            state: SessionState::Created,
            resolved: Vec::new(),
            started_at: Local::now(),
            finished_at: None,
            stats: Arc::new(ScanStats::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Local>> {
        self.finished_at
    }

    /// Accept or degrade the configured credential.
    ///
    /// A non-empty token is taken as-is; validation failures surface later as
    /// authorization errors from the API. An empty token switches the session
    /// into public-only mode. Calling this twice with the same input is a
    /// no-op.
    pub fn resolve_credential(&mut self, token: Option<&str>) {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                if self.token.as_deref() != Some(token) {
                    self.token = Some(token.to_string());
                    self.auth_mode = AuthMode::Token;
                }
            }
            None => {
                self.token = None;
                self.auth_mode = AuthMode::Anonymous;
                info!("No API token supplied; only public repositories will be scanned");
            }
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Mark user input as validated. The caller performs the actual target
    /// classification; this only records the transition.
    pub fn mark_validated(&mut self) {
        debug_assert_eq!(self.state, SessionState::Created);
        self.state = SessionState::Validated;
    }

    pub fn begin_resolving(&mut self) {
        debug_assert_eq!(self.state, SessionState::Validated);
        self.state = SessionState::Resolving;
    }

    /// Append a repository discovered by a gatherer. Only legal while
    /// resolution is in flight.
    pub fn push_resolved(&mut self, repo: Arc<RepositoryRef>) {
        debug_assert_eq!(self.state, SessionState::Resolving);
        self.resolved.push(repo);
    }

    /// Declare resolution complete and hand the set to analysis.
    pub fn begin_analyzing(&mut self) {
        debug_assert_eq!(self.state, SessionState::Resolving);
        self.state = SessionState::Analyzing;
    }

    /// The resolved repository set. Empty until resolution has run.
    pub fn resolved_repositories(&self) -> &[Arc<RepositoryRef>] {
        &self.resolved
    }

    /// Stop the timer and freeze the session. Idempotent: the finish
    /// timestamp is set at most once.
    pub fn finish(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Local::now());
        }
        self.state = SessionState::Finished;
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Local::now) - self.started_at
    }
}

// Manual impl so the token never leaks into debug logs.
impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("scan_type", &self.scan_type)
            .field("api_url", &self.api_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("auth_mode", &self.auth_mode)
            .field("bind_address", &self.bind_address)
            .field("bind_port", &self.bind_port)
            .field("limits", &self.limits)
            .field("targets", &self.targets)
            .field("state", &self.state)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(targets: TargetSpec) -> ScanSession {
        ScanSession::new(
            Url::parse("https://github.example.com/api/v3/").unwrap(),
            "127.0.0.1".into(),
            9393,
            SessionLimits::new(50, 0, 4, 3),
            targets,
            false,
            true,
        )
    }

    #[test]
    fn target_spec_normalizes_and_dedups() {
        let spec = TargetSpec::new(
            vec!["Alice".into(), "alice ".into(), "".into()],
            vec!["ACME".into()],
            Vec::new(),
        );
        assert_eq!(spec.logins.len(), 1);
        assert!(spec.logins.contains("alice"));
        assert!(spec.organizations.contains("acme"));
    }

    #[test]
    fn zero_threads_clamps_to_at_least_one() {
        let limits = SessionLimits::new(50, 0, 0, 3);
        assert!(limits.num_threads >= 1);
    }

    #[test]
    fn finish_sets_timestamp_exactly_once() {
        let mut sess = session(TargetSpec::default());
        assert!(sess.finished_at().is_none());
        sess.finish();
        let first = sess.finished_at().expect("finish should set the timestamp");
        assert!(first >= sess.started_at());
        sess.finish();
        assert_eq!(sess.finished_at(), Some(first));
    }

    #[test]
    fn credential_resolution_is_idempotent() {
        let mut sess = session(TargetSpec::default());
        sess.resolve_credential(Some("ghp_sometoken"));
        assert_eq!(sess.auth_mode, AuthMode::Token);
        sess.resolve_credential(Some("ghp_sometoken"));
        assert_eq!(sess.token(), Some("ghp_sometoken"));

        sess.resolve_credential(None);
        assert_eq!(sess.auth_mode, AuthMode::Anonymous);
        assert_eq!(sess.token(), None);
    }

    #[test]
    fn debug_output_redacts_token() {
        let mut sess = session(TargetSpec::default());
        sess.resolve_credential(Some("ghp_supersecret"));
        let rendered = format!("{sess:?}");
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("<redacted>"));
    }
}
