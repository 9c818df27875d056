use std::path::PathBuf;

use clap::{ArgAction, Args, ValueHint};
use url::Url;

/// `heron scan` command and flags
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// GitHub user logins to scan (comma-separated or repeated)
    #[arg(long = "user", alias = "users", value_delimiter = ',', value_name = "LOGIN")]
    pub user: Vec<String>,

    /// GitHub Enterprise organizations to scan (comma-separated or repeated)
    #[arg(
        long = "org",
        alias = "orgs",
        alias = "github-enterprise-orgs",
        value_delimiter = ',',
        value_name = "ORG"
    )]
    pub organization: Vec<String>,

    /// Named repositories to scan; requires an owning --org or --user
    #[arg(
        long = "repo",
        alias = "repos",
        alias = "github-enterprise-repos",
        value_delimiter = ',',
        value_name = "REPO"
    )]
    pub repository: Vec<String>,

    /// API token; without one only public repositories are scanned
    #[arg(
        long = "api-token",
        alias = "github-enterprise-api-token",
        env = "HERON_GITHUB_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub api_token: Option<String>,

    /// The API endpoint for GitHub Enterprise
    #[arg(
        long = "api-url",
        alias = "github-enterprise-url",
        default_value = "https://api.github.com/",
        value_hint = ValueHint::Url
    )]
    pub api_url: Url,

    /// Number of analysis workers; 0 picks a default based on the machine
    #[arg(long = "num-threads", short = 'j', default_value_t = 0)]
    pub num_threads: usize,

    /// Max file size to scan, in megabytes
    #[arg(long = "max-file-size", default_value_t = 50, value_name = "MB")]
    pub max_file_size: u64,

    /// Clone depth; 0 clones full history
    #[arg(long = "commit-depth", default_value_t = 0)]
    pub commit_depth: u32,

    /// Match sensitivity; higher levels enable noisier signatures
    #[arg(long = "match-level", default_value_t = 3, value_name = "LEVEL")]
    pub match_level: u8,

    /// File containing detection signatures; defaults to the built-in set
    #[arg(long = "signature-file", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub signature_file: Option<PathBuf>,

    /// Scan forked repositories
    #[arg(long = "scan-forks", default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub scan_forks: bool,

    /// Hide secret values in output
    #[arg(long = "hide-secrets", default_value_t = false)]
    pub hide_secrets: bool,

    /// Emit the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress the interactive messaging of the trailing serve state
    #[arg(long, default_value_t = false)]
    pub silent: bool,

    /// List the resolved repositories without scanning them
    #[arg(long = "list-only", default_value_t = false)]
    pub list_only: bool,

    /// The bind address for the status endpoint
    #[arg(long = "bind-address", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// The bind port for the status endpoint
    #[arg(long = "bind-port", default_value_t = 9393)]
    pub bind_port: u16,
}
