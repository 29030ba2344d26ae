//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Static flow-graph analyzer for JavaScript/TypeScript projects
#[derive(Parser, Debug)]
#[command(name = "codeflow")]
#[command(about = "Builds execution-flow graphs, structural inventories and import impact maps")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true, env = "CODEFLOW_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a single file: structure plus normalized flow graph
    Analyze {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Analyze a project directory
    Project {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Run the full job pipeline (merge, enrich, persist) instead of the
        /// per-file file tree
        #[arg(long)]
        full: bool,

        /// Project id used for persisted jobs and graphs
        #[arg(long, value_name = "ID")]
        project_id: Option<String>,

        /// Only these extensions (without dots), comma separated
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },

    /// Print the resolved import map of a project directory
    Impact {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },

    /// Case-insensitive search over a project's symbols and source lines
    Search {
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        #[arg(value_name = "QUERY")]
        query: String,

        /// Only these extensions (without dots), comma separated
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },

    /// List persisted jobs of a project
    Jobs {
        #[arg(value_name = "PROJECT")]
        project_id: String,
    },

    /// Show one persisted job
    Status {
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },

    /// Print the latest saved graph of a project
    Graph {
        #[arg(value_name = "PROJECT")]
        project_id: String,
    },

    /// Saved graph history across projects, newest first
    Graphs {
        /// Number of graphs to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete persisted jobs older than the retention window
    Prune {
        /// Days to keep (defaults to `jobs.retention_days`)
        #[arg(long)]
        days: Option<u32>,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented JSON
    #[default]
    Pretty,
    /// Single-line JSON
    Json,
}

impl OutputFormat {
    pub fn render<T: serde::Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
            OutputFormat::Json => serde_json::to_string(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_project_full() {
        let cli = Cli::parse_from([
            "codeflow",
            "project",
            "./app",
            "--full",
            "--ext",
            "ts,tsx",
            "-f",
            "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Project { full, ext, .. } => {
                assert!(full);
                assert_eq!(ext, vec!["ts", "tsx"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_search_and_graphs() {
        let cli = Cli::parse_from(["codeflow", "search", "./app", "useAuth", "--ext", "tsx"]);
        match cli.command {
            Command::Search { query, ext, .. } => {
                assert_eq!(query, "useAuth");
                assert_eq!(ext, vec!["tsx"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["codeflow", "graphs"]);
        assert!(matches!(cli.command, Command::Graphs { limit: 20 }));
        let cli = Cli::parse_from(["codeflow", "graphs", "--limit", "5"]);
        assert!(matches!(cli.command, Command::Graphs { limit: 5 }));
    }

    #[test]
    fn test_render_formats() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(OutputFormat::Json.render(&value).unwrap(), "{\"a\":1}");
        assert!(OutputFormat::Pretty.render(&value).unwrap().contains('\n'));
    }
}
