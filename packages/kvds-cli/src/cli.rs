use clap::Parser;

/// An in-memory ordered key-value store with interchangeable engines.
///
/// Help, unknown-algorithm, and too-many-argument handling is special-cased
/// in `main` ahead of clap so the exact wording and exit codes match the
/// command-line contract; clap only parses the one positional argument.
#[derive(Parser, Debug)]
#[command(disable_help_flag = true, disable_help_subcommand = true)]
pub struct Args {
    /// Name or short name of the storage algorithm to use.
    pub algorithm: Option<String>,
}
