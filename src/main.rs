//! tocainstall - Main entry point

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tocainstall::catalog;
use tocainstall::cli::{Cli, Commands};
use tocainstall::config_file::{InstallationConfig, PopulationSource};
use tocainstall::error::{EXIT_FAILURE, EXIT_SUCCESS, InstallError};
use tocainstall::hardware::{DEFAULT_PROBE_HOST, detect_internet, probe_target};
use tocainstall::pipeline::Installer;
use tocainstall::process_guard::{self, ProcessGuard};
use tocainstall::prompt;
use tocainstall::sanity::{Requirements, run_preflight_checks};
use tocainstall::{CommandRunner, SystemRunner};

/// Logs go to stderr; `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("{:?}", cli);

    let code = match run(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            e.downcast_ref::<InstallError>()
                .map(InstallError::exit_code)
                .unwrap_or(EXIT_FAILURE)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            let loaded = InstallationConfig::load_from_file(&config)?;
            loaded
                .validate()
                .with_context(|| format!("{} is not valid", config.display()))?;
            println!("✓ Configuration file is valid: {}", config.display());
            Ok(())
        }
        Commands::Plan { config } => {
            let loaded = InstallationConfig::load_from_file(&config)?;
            let plan = loaded.to_preview_plan()?;
            print!("{}", plan.summary());
            Ok(())
        }
        Commands::Disks => {
            let disks = catalog::list_disks(&SystemRunner::new());
            if disks.is_empty() {
                println!("No installable disks found");
            }
            for disk in disks {
                println!("{}", disk);
            }
            Ok(())
        }
        Commands::Install {
            config,
            save_config,
            yes,
        } => install(config.as_deref(), save_config, yes, cli.skip_root_check),
    }
}

fn install(
    config_path: Option<&Path>,
    save_config: Option<PathBuf>,
    yes: bool,
    skip_root: bool,
) -> anyhow::Result<()> {
    // Reaps any tool still running when this function returns
    let _guard = ProcessGuard::new();
    let runner = SystemRunner::new();

    run_preflight_checks(&Requirements::baseline(skip_root))?;

    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            let loaded = InstallationConfig::load_from_file(path)?;
            loaded.validate()?;
            loaded
        }
        None => InstallationConfig::default(),
    };

    let (host, port) = match &config.source {
        PopulationSource::Bootstrap { mirror, .. } => probe_target(mirror),
        PopulationSource::LocalCopy { .. } => None,
    }
    .unwrap_or_else(|| (DEFAULT_PROBE_HOST.to_string(), 80));

    let network = if config_path.is_some() {
        detect_internet(&host, port)
    } else {
        prompt::network_setup(&runner, &host, port)?
    };

    if config_path.is_some() {
        prompt::fill_missing_secrets(&mut config)?;
    } else {
        config = prompt::collect_config(&runner, config)?;
    }

    if let Some(path) = &save_config {
        config.save_to_file(path)?;
        info!("Configuration saved to {} (secrets omitted)", path.display());
    }

    let plan = config.to_plan(network)?;
    run_preflight_checks(&Requirements::for_plan(&plan, skip_root))?;

    if yes {
        println!("{}", plan.summary());
    } else {
        prompt::confirm_install(&plan)?;
    }

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    run_pipeline(&runner, &plan)
}

fn run_pipeline(runner: &dyn CommandRunner, plan: &tocainstall::InstallPlan) -> anyhow::Result<()> {
    let mut installer = Installer::new(runner, plan);
    installer.confirm_destructive_operations();
    let report = installer.run()?;

    println!();
    for result in &report.results {
        println!("{}", result);
    }
    if !report.teardown_problems.is_empty() {
        println!("Cleanup finished with {} warning(s):", report.teardown_problems.len());
        for problem in &report.teardown_problems {
            println!("  - {}", problem);
        }
    }
    println!("\n✓ Installation complete. Remove the install medium and reboot.");
    Ok(())
}
