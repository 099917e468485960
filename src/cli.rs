use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "logvault", version, about = "Inspect and maintain a bounded log store")]
pub struct Cli {
    /// Configuration file path (default: ./config.toml when present)
    #[arg(short, long, global = true, env = "LOGVAULT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show one page of a tag, newest first (default)
    Show(ShowArgs),

    /// Show the end of a tag's log file (file backend)
    Tail {
        /// Tag to read; empty for the default tag
        #[arg(short, long, default_value = "")]
        tag: String,

        /// Approximate number of bytes to read from the end
        #[arg(short, long, default_value = "4096")]
        bytes: i64,

        /// Output format (text, json)
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },

    /// Store one entry
    Write {
        #[arg(short, long, default_value = "")]
        tag: String,

        /// Color marker (red, yellow, green, ...)
        #[arg(long, default_value = "white")]
        color: String,

        /// Call-site trace stored with the entry
        #[arg(long, default_value = "logvault-cli")]
        trace: String,

        message: String,
    },

    /// Delete one entry by id, or an inclusive id range with --to
    Delete {
        #[arg(short, long, default_value = "")]
        tag: String,

        id: i64,

        /// Last id of the range to delete
        #[arg(long)]
        to: Option<i64>,
    },

    /// Delete entries written before a timestamp, of one tag or of all tags
    Prune {
        /// Tag to prune; every tag when omitted
        #[arg(short, long)]
        tag: Option<String>,

        /// Boundary, exclusive (`YYYY-MM-DD HH:MM:SS[.mmm]`)
        #[arg(long)]
        before: String,
    },

    /// Delete every entry of one tag
    Clear {
        #[arg(short, long, default_value = "")]
        tag: String,
    },

    /// Delete every entry of every tag and restart ids
    ClearAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Count stored entries per tag
    Count {
        /// Tags to count (repeatable); default tag when omitted
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ShowArgs {
    /// Tag to show; empty for the default tag
    #[arg(short, long, default_value = "")]
    pub tag: String,

    /// Zero-based page number
    #[arg(short, long, default_value = "0")]
    pub page: u32,

    /// Entries per page
    #[arg(short = 'n', long, default_value = "20")]
    pub count: u32,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

impl Default for ShowArgs {
    fn default() -> Self {
        Self {
            tag: String::new(),
            page: 0,
            count: 20,
            format: "text".to_string(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Show if none provided
    pub fn get_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Show(ShowArgs::default()))
    }
}
