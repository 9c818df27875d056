// tests/int_resolver.rs
use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use anyhow::Result;
use async_trait::async_trait;
use heron::{
    github::{GatherError, Gatherer, OrgRef, RepositoryRef},
    resolver::resolve_targets,
    session::{ScanSession, SessionLimits, SessionState, TargetSpec},
};
use url::Url;

/// In-memory gatherer backed by fixture maps. Every call is appended to a
/// shared log so tests can assert on ordering.
struct MockGatherer {
    login_repos: BTreeMap<String, Vec<RepositoryRef>>,
    org_repos: BTreeMap<String, Vec<RepositoryRef>>,
    calls: Mutex<Vec<String>>,
}

impl MockGatherer {
    fn new() -> Self {
        Self { login_repos: BTreeMap::new(), org_repos: BTreeMap::new(), calls: Mutex::new(Vec::new()) }
    }

    fn with_login(mut self, login: &str, repos: &[RepositoryRef]) -> Self {
        self.login_repos.insert(login.to_string(), repos.to_vec());
        self
    }

    fn with_org(mut self, org: &str, repos: &[RepositoryRef]) -> Self {
        self.org_repos.insert(org.to_string(), repos.to_vec());
        self
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gatherer for MockGatherer {
    async fn repositories_for_login(&self, login: &str) -> Result<Vec<RepositoryRef>, GatherError> {
        self.log(format!("login:{login}"));
        self.login_repos.get(login).cloned().ok_or_else(|| GatherError::NotFound(login.to_string()))
    }

    async fn organization(&self, name: &str) -> Result<OrgRef, GatherError> {
        self.log(format!("org:{name}"));
        if self.org_repos.contains_key(name) {
            Ok(OrgRef { login: name.to_string() })
        } else {
            Err(GatherError::NotFound(name.to_string()))
        }
    }

    async fn organization_repositories(
        &self,
        org: &OrgRef,
    ) -> Result<Vec<RepositoryRef>, GatherError> {
        self.log(format!("org_repos:{}", org.login));
        self.org_repos
            .get(&org.login)
            .cloned()
            .ok_or_else(|| GatherError::NotFound(org.login.clone()))
    }

    async fn owner_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<RepositoryRef, GatherError> {
        self.log(format!("repo:{owner}/{name}"));
        let owned = self.org_repos.get(owner).or_else(|| self.login_repos.get(owner));
        owned
            .and_then(|repos| repos.iter().find(|r| r.name == name).cloned())
            .ok_or_else(|| GatherError::NotFound(format!("{owner}/{name}")))
    }
}

fn repo(owner: &str, name: &str) -> RepositoryRef {
    RepositoryRef {
        owner: owner.to_string(),
        name: name.to_string(),
        private: false,
        fork: false,
        clone_url: format!("https://github.example.com/{owner}/{name}.git"),
    }
}

fn fork(owner: &str, name: &str) -> RepositoryRef {
    RepositoryRef { fork: true, ..repo(owner, name) }
}

fn session(targets: TargetSpec, scan_forks: bool) -> ScanSession {
    let mut session = ScanSession::new(
        Url::parse("https://github.example.com/api/v3/").unwrap(),
        "127.0.0.1".into(),
        9393,
        SessionLimits::new(50, 0, 2, 3),
        targets,
        false,
        scan_forks,
    );
    session.mark_validated();
    session
}

fn targets(logins: &[&str], orgs: &[&str], repos: &[&str]) -> TargetSpec {
    TargetSpec::new(
        logins.iter().map(|s| s.to_string()),
        orgs.iter().map(|s| s.to_string()),
        repos.iter().map(|s| s.to_string()),
    )
}

#[tokio::test]
async fn login_targets_enumerate_everything_visible() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_login("alice", &[repo("alice", "dotfiles"), repo("alice", "blog")]);
    let mut sess = session(targets(&["alice"], &[], &[]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 2);
    assert!(outcome.skipped.is_empty());
    assert_eq!(sess.resolved_repositories().len(), 2);
    Ok(())
}

#[tokio::test]
async fn missing_org_is_skipped_without_aborting_the_rest() -> Result<()> {
    let gatherer = MockGatherer::new().with_org("acme", &[repo("acme", "widget")]);
    let mut sess = session(targets(&[], &["acme", "ghost"], &[]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 1);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].target, "ghost");
    assert_eq!(sess.stats.snapshot().targets_skipped, 1);
    // NotFound is a skip, not an error
    assert_eq!(sess.stats.snapshot().errors, 0);
    Ok(())
}

#[tokio::test]
async fn org_validation_completes_before_named_repo_lookups() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_org("acme", &[repo("acme", "widget")])
        .with_org("globex", &[repo("globex", "gadget")]);
    let mut sess = session(targets(&[], &["acme", "globex"], &["widget", "gadget"]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 2);

    let calls = gatherer.calls();
    let last_org = calls.iter().rposition(|c| c.starts_with("org:")).unwrap();
    let first_repo = calls.iter().position(|c| c.starts_with("repo:")).unwrap();
    assert!(last_org < first_repo, "owner validation must finish first: {calls:?}");
    Ok(())
}

#[tokio::test]
async fn named_repo_resolves_against_first_owner_that_has_it() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_org("acme", &[repo("acme", "widget")])
        .with_org("globex", &[repo("globex", "widget")]);
    let mut sess = session(targets(&[], &["acme", "globex"], &["widget"]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 1);
    assert_eq!(sess.resolved_repositories()[0].owner, "acme");
    Ok(())
}

#[tokio::test]
async fn named_repo_with_no_validated_owner_is_skipped() -> Result<()> {
    let gatherer = MockGatherer::new();
    let mut sess = session(targets(&[], &["ghost"], &["widget"]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 0);
    // Both the org and the orphaned repo are recorded
    assert_eq!(outcome.skipped.len(), 2);
    assert!(sess.resolved_repositories().is_empty());
    Ok(())
}

#[tokio::test]
async fn login_scoped_named_repos_resolve() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_login("alice", &[repo("alice", "dotfiles"), repo("alice", "blog")]);
    let mut sess = session(targets(&["alice"], &[], &["blog"]), true);

    let outcome = resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(outcome.discovered, 1);
    assert_eq!(sess.resolved_repositories()[0].name, "blog");
    Ok(())
}

#[tokio::test]
async fn forks_are_filtered_when_disabled() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_org("acme", &[repo("acme", "widget"), fork("acme", "forked-widget")]);

    let mut with_forks = session(targets(&[], &["acme"], &[]), true);
    let outcome = resolve_targets(&gatherer, &mut with_forks, None).await?;
    assert_eq!(outcome.discovered, 2);

    let mut without_forks = session(targets(&[], &["acme"], &[]), false);
    let outcome = resolve_targets(&gatherer, &mut without_forks, None).await?;
    assert_eq!(outcome.discovered, 1);
    assert_eq!(without_forks.resolved_repositories()[0].name, "widget");
    Ok(())
}

#[tokio::test]
async fn resolution_is_deterministic_across_runs() -> Result<()> {
    let gatherer = MockGatherer::new()
        .with_org("acme", &[repo("acme", "widget"), repo("acme", "gadget")])
        .with_org("globex", &[repo("globex", "gizmo")]);

    let mut names = Vec::new();
    for _ in 0..2 {
        let mut sess = session(targets(&[], &["globex", "acme"], &[]), true);
        resolve_targets(&gatherer, &mut sess, None).await?;
        names.push(
            sess.resolved_repositories().iter().map(|r| r.full_name()).collect::<Vec<_>>(),
        );
    }
    assert_eq!(names[0], names[1]);
    Ok(())
}

#[tokio::test]
async fn resolution_moves_the_session_into_resolving() -> Result<()> {
    let gatherer = MockGatherer::new().with_org("acme", &[repo("acme", "widget")]);
    let mut sess = session(targets(&[], &["acme"], &[]), true);

    resolve_targets(&gatherer, &mut sess, None).await?;
    assert_eq!(sess.state(), SessionState::Resolving);
    Ok(())
}
