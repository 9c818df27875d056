//! Target resolution: maps the three optional target sets onto one
//! enumeration strategy and drives the gatherers in dependency order.

use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    github::{GatherError, Gatherer, OrgRef, RepositoryRef},
    session::{ScanSession, TargetSpec},
};

/// Policy-level violations of the target specification. These are fatal
/// before any network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TargetScopeError {
    #[error("repositories were named but no organization or login was given to resolve them against")]
    NoOwnerContext,

    #[error("ambiguous target scope: both logins and organizations were given without naming repositories")]
    AmbiguousTargetScope,

    #[error("no logins, organizations, or repositories were given")]
    NoTargets,
}

/// The five-way classification of a target specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Enumerate every repository visible to each login.
    ByLogin,
    /// Enumerate each organization, then all of its repositories.
    ByOrg,
    /// Validate the named organizations, then fetch the named repositories
    /// scoped to them.
    ByOrgThenRepo,
    /// Validate the named logins, then fetch the named repositories scoped
    /// to them.
    ByLoginThenRepo,
    Invalid(TargetScopeError),
}

/// Pure classification, evaluated in a fixed priority order so overlapping
/// hints always resolve the same way. No network dependency.
pub fn classify(targets: &TargetSpec) -> ResolutionStrategy {
    let logins = !targets.logins.is_empty();
    let orgs = !targets.organizations.is_empty();
    let repos = !targets.repositories.is_empty();

    if repos {
        if orgs {
            ResolutionStrategy::ByOrgThenRepo
        } else if logins {
            ResolutionStrategy::ByLoginThenRepo
        } else {
            ResolutionStrategy::Invalid(TargetScopeError::NoOwnerContext)
        }
    } else if logins && orgs {
        ResolutionStrategy::Invalid(TargetScopeError::AmbiguousTargetScope)
    } else if logins {
        ResolutionStrategy::ByLogin
    } else if orgs {
        ResolutionStrategy::ByOrg
    } else {
        ResolutionStrategy::Invalid(TargetScopeError::NoTargets)
    }
}

/// A target that could not be resolved. Recorded, reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTarget {
    pub target: String,
    pub reason: String,
}

/// What a resolution run produced beyond the session's resolved list.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub discovered: usize,
    pub skipped: Vec<SkippedTarget>,
}

struct ResolutionState<'s> {
    session: &'s mut ScanSession,
    seen: HashSet<String>,
    skipped: Vec<SkippedTarget>,
    discovered: usize,
}

impl<'s> ResolutionState<'s> {
    fn push(&mut self, repo: RepositoryRef) {
        if repo.fork && !self.session.scan_forks {
            debug!("Skipping fork {repo}");
            return;
        }
        if self.seen.insert(repo.full_name()) {
            self.discovered += 1;
            self.session.push_resolved(Arc::new(repo));
        }
    }

    fn push_all(&mut self, repos: Vec<RepositoryRef>) {
        for repo in repos {
            self.push(repo);
        }
    }

    fn skip(&mut self, target: &str, err: &GatherError) {
        warn!("Skipping {target}: {err}");
        self.session.stats.add_target_skipped();
        if !matches!(err, GatherError::NotFound(_)) {
            self.session.stats.add_error();
        }
        self.skipped.push(SkippedTarget { target: target.to_string(), reason: err.to_string() });
    }
}

/// Execute the strategy selected by [`classify`] against a gatherer and
/// populate the session's resolved repository set.
///
/// Prerequisite gathers (org and login validation) always run to completion
/// before any repository-scoped lookup starts. Per-target failures are
/// recorded and do not abort the remaining targets.
pub async fn resolve_targets<G: Gatherer>(
    gatherer: &G,
    session: &mut ScanSession,
    progress: Option<&ProgressBar>,
) -> Result<ResolutionOutcome> {
    let strategy = classify(&session.targets);
    session.begin_resolving();

    let targets = session.targets.clone();
    let mut state = ResolutionState {
        session,
        seen: HashSet::new(),
        skipped: Vec::new(),
        discovered: 0,
    };

    match strategy {
        ResolutionStrategy::ByLogin => {
            for login in &targets.logins {
                match gatherer.repositories_for_login(login).await {
                    Ok(repos) => state.push_all(repos),
                    Err(e) => state.skip(login, &e),
                }
                if let Some(pb) = progress {
                    pb.inc(1);
                }
            }
        }
        ResolutionStrategy::ByOrg => {
            for name in &targets.organizations {
                let org = match gatherer.organization(name).await {
                    Ok(org) => org,
                    Err(e) => {
                        state.skip(name, &e);
                        continue;
                    }
                };
                match gatherer.organization_repositories(&org).await {
                    Ok(repos) => {
                        if repos.is_empty() {
                            info!("Organization {name} has no repositories");
                        }
                        state.push_all(repos);
                    }
                    Err(e) => state.skip(name, &e),
                }
                if let Some(pb) = progress {
                    pb.inc(1);
                }
            }
        }
        ResolutionStrategy::ByOrgThenRepo => {
            let mut owners = Vec::new();
            for name in &targets.organizations {
                match gatherer.organization(name).await {
                    Ok(org) => owners.push(org),
                    Err(e) => state.skip(name, &e),
                }
            }
            resolve_named_repositories(
                gatherer,
                &mut state,
                &targets,
                &owners.iter().map(|o: &OrgRef| o.login.clone()).collect::<Vec<_>>(),
                progress,
            )
            .await;
        }
        ResolutionStrategy::ByLoginThenRepo => {
            let mut owners = Vec::new();
            for login in &targets.logins {
                // The full listing validates the login and doubles as the
                // owner context for the named lookups below.
                match gatherer.repositories_for_login(login).await {
                    Ok(_) => owners.push(login.clone()),
                    Err(e) => state.skip(login, &e),
                }
            }
            resolve_named_repositories(gatherer, &mut state, &targets, &owners, progress).await;
        }
        ResolutionStrategy::Invalid(e) => return Err(e.into()),
    }

    info!("Resolved {} repositories to scan", state.discovered);
    Ok(ResolutionOutcome { discovered: state.discovered, skipped: state.skipped })
}

/// Look up each explicitly named repository against the validated owners, in
/// order; the first owner that has it wins. Only runs once owner validation
/// has fully completed.
async fn resolve_named_repositories<G: Gatherer>(
    gatherer: &G,
    state: &mut ResolutionState<'_>,
    targets: &TargetSpec,
    owners: &[String],
    progress: Option<&ProgressBar>,
) {
    for name in &targets.repositories {
        let mut found = false;
        let mut last_err: Option<GatherError> = None;
        for owner in owners {
            match gatherer.owner_repository(owner, name).await {
                Ok(repo) => {
                    state.push(repo);
                    found = true;
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        if !found {
            let err = last_err
                .unwrap_or_else(|| GatherError::NotFound(format!("{name} (no validated owner)")));
            state.skip(name, &err);
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
    }
}
