//! CLI command handlers.

use clap::Subcommand;

pub mod diagnostics;
pub mod root;

#[derive(Subcommand)]
pub enum Commands {
    /// Print the resolved configuration and a point-in-time cluster snapshot.
    Diagnostics,
}
