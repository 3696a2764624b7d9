//! Command-line interface for the `glossary` binary

use clap::{Parser, Subcommand};
use glossary_common::config::{CompiledDefaults, CONFIG_FILE, ROOT_FOLDER_ENV};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "glossary")]
#[command(about = "AI/ML glossary data pipeline and API server")]
#[command(version)]
pub struct Cli {
    /// Root folder holding the database, config and import state
    #[arg(long, global = true, env = ROOT_FOLDER_ENV)]
    pub root_folder: Option<PathBuf>,

    /// TOML config file (default: <root folder>/glossary.toml)
    #[arg(long, global = true, env = "GLOSSARY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Config file location, before the root folder is fully resolved
    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        self.root_folder
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().root_folder)
            .join(CONFIG_FILE)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Overrides `port` from the config
        #[arg(long)]
        port: Option<u16>,

        /// Overrides `bind_address` from the config
        #[arg(long)]
        bind: Option<String>,
    },

    /// Turn a glossary sheet into the structured dataset JSON
    Process {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = 100)]
        chunk_size: usize,

        /// Stop after this many chunks
        #[arg(long)]
        max_chunks: Option<usize>,

        /// Also load the dataset into the database
        #[arg(long)]
        import: bool,
    },

    /// Split a dataset JSON into chunk files
    Split {
        input: PathBuf,
        output_dir: PathBuf,

        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
    },

    /// Export raw sheet rows as JSON chunk files
    ExportChunks {
        input: PathBuf,
        output_dir: PathBuf,

        #[arg(long, default_value_t = 100)]
        chunk_size: usize,
    },

    /// Convert between Excel, CSV and JSON records
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Re-read the output and compare shapes
        #[arg(long)]
        validate: bool,
    },

    /// Print the structure of a glossary sheet
    Inspect { input: PathBuf },

    /// Change-detecting import; writes a SQL script of new and edited terms
    Import {
        input: PathBuf,

        /// Ignore stored hashes and emit every term
        #[arg(long)]
        force_all: bool,

        /// Compare only, write nothing
        #[arg(long)]
        dry_run: bool,

        #[arg(long, default_value_t = 100)]
        chunk_size: usize,

        /// Apply the changes to the database directly
        #[arg(long)]
        apply: bool,

        /// Where the script, hash store and summary go (default: <root folder>/import)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Execute a generated SQL script against the database
    Execute { sql_file: PathBuf },

    /// Fill empty cells of a CSV or JSON sheet with AI-generated content
    Generate {
        input: PathBuf,

        /// topdown or bottomup
        #[arg(long, default_value = "topdown")]
        mode: String,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Delete the checkpoint and start over
        #[arg(long)]
        reset_checkpoint: bool,

        /// Checkpoint file (default: checkpoint.json next to the input)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Store the OpenAI API key in the database settings
    SetApiKey { key: String },

    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let cli = Cli::parse_from([
            "glossary",
            "generate",
            "terms.csv",
            "--mode",
            "bottomup",
            "--workers",
            "4",
            "--reset-checkpoint",
        ]);
        match cli.command {
            Command::Generate {
                input,
                mode,
                workers,
                reset_checkpoint,
                batch_size,
                ..
            } => {
                assert_eq!(input, PathBuf::from("terms.csv"));
                assert_eq!(mode, "bottomup");
                assert_eq!(workers, Some(4));
                assert!(reset_checkpoint);
                assert_eq!(batch_size, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_path_follows_explicit_root() {
        let cli = Cli::parse_from([
            "glossary",
            "--root-folder",
            "/srv/glossary",
            "inspect",
            "terms.xlsx",
        ]);
        assert_eq!(cli.config_path(), PathBuf::from("/srv/glossary/glossary.toml"));
        assert!(matches!(cli.command, Command::Inspect { .. }));
    }

    #[test]
    fn test_parse_maintenance_commands() {
        let cli = Cli::parse_from(["glossary", "set-api-key", "sk-live"]);
        assert!(matches!(cli.command, Command::SetApiKey { ref key } if key == "sk-live"));

        let cli = Cli::parse_from([
            "glossary",
            "--config",
            "/etc/glossary.toml",
            "init-config",
            "--force",
        ]);
        assert_eq!(cli.config_path(), PathBuf::from("/etc/glossary.toml"));
        assert!(matches!(cli.command, Command::InitConfig { force: true }));
    }
}
