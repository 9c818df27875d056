use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::Serialize;

use crate::github::RepositoryRef;

/// A single signature hit inside a repository.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub signature: String,
    pub repository: String,
    pub path: PathBuf,
    /// 1-based line number; 0 for path/filename matches.
    pub line: u64,
    pub matched: String,
}

impl Finding {
    pub fn new(
        signature: &str,
        repo: &RepositoryRef,
        path: PathBuf,
        line: u64,
        matched: String,
    ) -> Self {
        Self { signature: signature.to_string(), repository: repo.full_name(), path, line, matched }
    }
}

/// In-memory store for findings, shared between analysis workers behind
/// `Arc<Mutex<..>>`.
#[derive(Debug, Default)]
pub struct FindingsStore {
    findings: Vec<Arc<Finding>>,
}

impl FindingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, finding: Finding) {
        self.findings.push(Arc::new(finding));
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[Arc<Finding>] {
        &self.findings
    }

    /// Finding counts per signature name, for the end-of-run summary.
    pub fn summary_by_signature(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for finding in &self.findings {
            *summary.entry(finding.signature.clone()).or_insert(0) += 1;
        }
        summary
    }
}
