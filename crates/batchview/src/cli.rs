//! Clap derive structures for the `batchview` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// batchview -- page through batch resources with a client-side cache
#[derive(Debug, Parser)]
#[command(
    name = "batchview",
    version,
    about = "Page, sort, and inspect batch resources from the command line",
    long_about = "Lists and inspects batch resources: pools, jobs, tasks, certificates,\n\
        and node files.\n\n\
        Resources are served page by page from a JSON fixture through the\n\
        batchview cache engine, then sorted client-side.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "BATCHVIEW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON fixture to serve resources from (overrides the config file)
    #[arg(long, short = 'F', env = "BATCHVIEW_FIXTURE", global = true)]
    pub fixture: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "BATCHVIEW_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Resources ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    /// Compute pools
    #[value(alias = "pool")]
    Pools,
    /// Jobs
    #[value(alias = "job")]
    Jobs,
    /// Tasks of a job (requires --job)
    #[value(alias = "task")]
    Tasks,
    /// Certificates, keyed by thumbprint algorithm + thumbprint
    #[value(alias = "certificate", alias = "certs")]
    Certificates,
    /// Files on a compute node (requires --pool and --node)
    #[value(alias = "node-file", alias = "files")]
    NodeFiles,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pools => "pools",
            Self::Jobs => "jobs",
            Self::Tasks => "tasks",
            Self::Certificates => "certificates",
            Self::NodeFiles => "node-files",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Pools => "pool",
            Self::Jobs => "job",
            Self::Tasks => "task",
            Self::Certificates => "certificate",
            Self::NodeFiles => "node file",
        }
    }

    /// Resources that live under a parent get one cache per parent.
    pub fn is_scoped(self) -> bool {
        matches!(self, Self::Tasks | Self::NodeFiles)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent resource flags for scoped kinds.
#[derive(Debug, Clone, Default, Args)]
pub struct ScopeArgs {
    /// Job the tasks belong to
    #[arg(long, short = 'j')]
    pub job: Option<String>,

    /// Pool the node belongs to
    #[arg(long)]
    pub pool: Option<String>,

    /// Compute node the files live on
    #[arg(long)]
    pub node: Option<String>,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List resources of one kind, page by page
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show a single resource
    Get(GetArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Resource kind to list
    pub kind: ResourceKind,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Server-side filter, as field=value (dotted paths allowed)
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Sort the loaded items by this field
    #[arg(long, short = 's')]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// Load every page before printing
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Items per page
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: Option<u32>,

    /// Number of pages to load (ignored with --all)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// Show at most this many items
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Resource kind
    pub kind: ResourceKind,

    /// Identifier (id, file name, or certificate thumbprint)
    pub key: String,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Thumbprint algorithm, for certificates
    #[arg(long, default_value = "sha1")]
    pub algorithm: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved configuration
    Show,

    /// Write a default config file
    Init {
        /// Fixture to record in the new config
        #[arg(long, value_name = "PATH")]
        with_fixture: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
