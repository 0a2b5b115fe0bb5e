use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// claimchart — falsity chart extraction from legal complaints
#[derive(Parser, Debug, Clone)]
#[command(name = "claimchart", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Model to use for all agent roles
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Maximum review iterations per run
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    /// Directory with prompt template overrides
    #[arg(long, global = true)]
    pub prompt_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to listen on (host:port)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Process one complaint file and print the result JSON to stdout
    Process {
        /// Path to a PDF or TXT complaint file
        file: PathBuf,

        /// Treat the file as already-extracted plain text
        #[arg(long)]
        text: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::parse_from(["claimchart", "serve"]);
        match cli.command {
            Commands::Serve { listen } => assert!(listen.is_none()),
            _ => panic!("expected serve subcommand"),
        }
        assert!(cli.config.is_none());
        assert!(cli.model.is_none());
    }

    #[test]
    fn test_parse_serve_with_listen() {
        let cli = Cli::parse_from(["claimchart", "serve", "--listen", "0.0.0.0:8080"]);
        match cli.command {
            Commands::Serve { listen } => assert_eq!(listen.as_deref(), Some("0.0.0.0:8080")),
            _ => panic!("expected serve subcommand"),
        }
    }

    #[test]
    fn test_parse_process_file() {
        let cli = Cli::parse_from(["claimchart", "process", "complaint.pdf"]);
        match cli.command {
            Commands::Process { file, text } => {
                assert_eq!(file, PathBuf::from("complaint.pdf"));
                assert!(!text);
            }
            _ => panic!("expected process subcommand"),
        }
    }

    #[test]
    fn test_parse_process_text_flag() {
        let cli = Cli::parse_from(["claimchart", "process", "--text", "complaint.txt"]);
        match cli.command {
            Commands::Process { text, .. } => assert!(text),
            _ => panic!("expected process subcommand"),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::parse_from([
            "claimchart",
            "serve",
            "--config",
            "custom.toml",
            "--max-iterations",
            "5",
        ]);
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        assert_eq!(cli.max_iterations, Some(5));
    }

    #[test]
    fn test_global_args_before_subcommand() {
        let cli = Cli::parse_from([
            "claimchart",
            "--model",
            "gemini-2.5-flash",
            "--prompt-dir",
            "/etc/claimchart/prompts",
            "process",
            "c.txt",
        ]);
        assert_eq!(cli.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(cli.prompt_dir.as_deref(), Some("/etc/claimchart/prompts"));
    }
}
