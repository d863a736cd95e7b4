use clap::{Parser, Subcommand, ValueEnum};

use crate::zim::ArchiveOptions;

#[derive(Parser, Debug)]
#[command(name = "runzim")]
#[command(version)]
#[command(about = "A Rust ZIM archive reader", long_about = None)]
#[command(after_help = "Examples:\n  \
  runzim wiki.zim                      show archive information\n  \
  runzim wiki.zim list Ban 20          list 20 titles starting with \"Ban\"\n  \
  runzim wiki.zim search rust 50       full-text search, skipping the first 50 hits\n  \
  runzim wiki.zim dump Banana | less   send the raw HTML of an article to a pager")]
pub struct Cli {
    /// ZIM file path
    #[arg(value_name = "FILE")]
    pub file: String,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Decompressed clusters to keep cached
    #[arg(
        long,
        value_name = "N",
        env = "RUNZIM_CACHE_CLUSTERS",
        default_value_t = ArchiveOptions::DEFAULT_CLUSTER_CACHE
    )]
    pub cache_clusters: usize,

    /// Longest redirect chain to follow
    #[arg(
        long,
        value_name = "N",
        env = "RUNZIM_MAX_REDIRECTS",
        default_value_t = ArchiveOptions::DEFAULT_REDIRECT_HOPS
    )]
    pub max_redirects: usize,

    /// Log level for diagnostics on stderr
    #[arg(short = 'L', long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Quiet mode: no informational notes on stderr
    #[arg(short = 'q')]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show archive information
    Info,

    /// List articles whose title starts with a prefix
    List {
        /// Title prefix (default: all articles)
        #[arg(default_value = "")]
        prefix: String,

        /// Maximum number of articles
        #[arg(default_value_t = 100)]
        limit: usize,

        /// Skip this many matches first
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Full-text search
    Search {
        query: String,

        /// Skip this many matches first
        #[arg(default_value_t = 0)]
        offset: usize,

        /// Maximum number of results
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show details of a single entry
    Get { path: String },

    /// Write the raw content of an entry to stdout or a file
    Dump {
        path: String,

        /// Output file (default: stdout)
        output: Option<String>,
    },

    /// Show a random article
    Random,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Info)
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::default()
            .with_cluster_cache_capacity(self.cache_clusters)
            .with_max_redirect_hops(self.max_redirects)
    }
}
