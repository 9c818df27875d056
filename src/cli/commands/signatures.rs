use std::path::PathBuf;

use clap::{Args, Subcommand, ValueHint};

/// Top-level signatures command group
#[derive(Args, Debug)]
pub struct SignaturesArgs {
    #[command(subcommand)]
    pub command: SignaturesCommand,

    /// Signature file to inspect; defaults to the built-in set
    #[arg(global = true, long = "signature-file", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub signature_file: Option<PathBuf>,

    /// Match sensitivity applied while loading
    #[arg(global = true, long = "match-level", default_value_t = 3, value_name = "LEVEL")]
    pub match_level: u8,
}

#[derive(Subcommand, Debug)]
pub enum SignaturesCommand {
    /// List the loaded signatures
    List,

    /// Verify that every signature compiles
    Check,
}
