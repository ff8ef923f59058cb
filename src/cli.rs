use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tocainstall - Debian-based installer with Btrfs and optional LUKS2
#[derive(Parser, Debug)]
#[command(name = "tocainstall")]
#[command(about = "Install a Debian-based system onto a whole disk (GPT, Btrfs, optional LUKS2)")]
#[command(version)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not require root. Meant for `plan`/`validate` on a workstation.
    #[arg(long, global = true)]
    pub skip_root_check: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the installer (interactive unless --config is given)
    Install {
        /// Load answers from a JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the collected answers (without secrets) to this file
        #[arg(long)]
        save_config: Option<PathBuf>,

        /// Skip the final typed confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Print what an install from this configuration would do
    Plan {
        /// Path to configuration file
        config: PathBuf,
    },
    /// List disks that can be installed to
    Disks,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["tocainstall"]).is_err());
    }

    #[test]
    fn test_cli_install_with_config() {
        let result = Cli::try_parse_from([
            "tocainstall",
            "install",
            "--config",
            "/path/to/config.json",
            "--yes",
        ]);
        assert!(result.is_ok());
        let cli = result.unwrap();
        match cli.command {
            Commands::Install { config, yes, save_config } => {
                assert_eq!(config.unwrap().to_str().unwrap(), "/path/to/config.json");
                assert!(yes);
                assert!(save_config.is_none());
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_validate_command() {
        let cli = Cli::try_parse_from(["tocainstall", "validate", "/path/to/config.json"]).unwrap();
        match cli.command {
            Commands::Validate { config } => {
                assert_eq!(config.to_str().unwrap(), "/path/to/config.json");
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tocainstall", "plan", "c.json", "--verbose", "--skip-root-check"])
            .unwrap();
        assert!(cli.verbose);
        assert!(cli.skip_root_check);
        assert!(matches!(cli.command, Commands::Plan { .. }));
    }

    #[test]
    fn test_cli_disks() {
        let cli = Cli::try_parse_from(["tocainstall", "disks"]).unwrap();
        assert!(matches!(cli.command, Commands::Disks));
    }
}
