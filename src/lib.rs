pub mod analyzer;
pub mod cli;
pub mod findings;
pub mod git_binary;
pub mod github;
pub mod reporter;
pub mod resolver;
pub mod scanner;
pub mod server;
pub mod session;
pub mod signatures;
