//! dex-cli: headless driver for the DEX Studio extension host.
//!
//! Loads installed bundles from the data directory with a [`LocalBridge`]
//! and exposes the host's lifecycle, dispatch and theme operations on the
//! command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use dex_host::core::settings::SettingsManager;
use dex_host::{LoadReport, LocalBridge, LocalBridgeConfig, PluginHost, PluginHostConfig};

/// Headless driver for the DEX Studio extension host
#[derive(Parser, Debug)]
#[command(name = "dex-cli", version, about, long_about = None)]
struct Cli {
    /// Data directory holding extensions, storage and settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory of installable bundles
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable UI-layout themes
    #[arg(long, global = true)]
    ui_layout_themes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List installed bundles
    List,
    /// Load every enabled bundle and report the outcome
    Load,
    /// Offer a file to the loaded extensions
    Open { path: String },
    /// Install a bundle from the catalog
    Install { id: String },
    /// Remove an installed bundle
    Uninstall { id: String },
    /// Enable a bundle
    Enable { id: String },
    /// Disable a bundle
    Disable { id: String },
    /// Load a project folder as a test extension
    Test {
        dir: PathBuf,
        /// Leave the staged test bundle installed
        #[arg(long)]
        keep: bool,
    },
    /// Activate an editor theme (omit the id to restore the default)
    Theme { id: Option<String> },
    /// Activate a UI-layout theme (omit the id to clear it)
    Layout { id: Option<String> },
    /// Show core controls after extension overrides
    Controls,
    /// Show or reset the settings document
    Settings {
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut bridge_config = match &cli.data_dir {
        Some(dir) => LocalBridgeConfig::rooted_at(dir),
        None => LocalBridgeConfig::default(),
    };
    if let Some(catalog) = &cli.catalog {
        bridge_config = bridge_config.with_catalog(catalog);
    }
    dex_host::init_logging(&bridge_config.data_dir.join("logs"));

    let settings = SettingsManager::new(&bridge_config.data_dir);
    let host_config = PluginHostConfig {
        ui_layout_themes: cli.ui_layout_themes,
        ..Default::default()
    };
    let mut host = PluginHost::new(host_config).context("failed to create extension host")?;
    host.attach_bridge(Arc::new(LocalBridge::new(bridge_config)));

    let current = settings.load();
    host.set_ui_theme(&current.ui_theme);

    match cli.command {
        Commands::List => {
            let bridge = host.services().bridge.get()?;
            let bundles = bridge.list_extensions().await?;
            if cli.json {
                print_json(&bundles)?;
            } else if bundles.is_empty() {
                println!("No extensions installed");
            } else {
                for bundle in bundles {
                    let state = if bundle.disabled { "disabled" } else { "enabled" };
                    println!("{:<32} {}", bundle.name, state);
                }
            }
        }
        Commands::Load => {
            let report = host.load_extensions().await?;
            if cli.json {
                print_json(&serde_json::json!({
                    "report": report,
                    "extensions": host.registry().infos(),
                }))?;
            } else {
                print_report(&report);
                for info in host.registry().infos() {
                    println!("  {} {} (priority {})", info.id, info.version, info.priority);
                }
            }
        }
        Commands::Open { path } => {
            host.load_extensions().await?;
            let outcome = host.dispatch_file_open(&path);
            let buttons: Vec<_> = host
                .registry()
                .buttons_for_file(&path)
                .into_iter()
                .cloned()
                .collect();
            let declared_by: Vec<String> = host
                .registry()
                .claimants_of(&path)
                .into_iter()
                .map(|e| e.manifest.id.clone())
                .collect();
            if cli.json {
                print_json(&serde_json::json!({
                    "outcome": outcome,
                    "buttons": buttons,
                    "declaredBy": declared_by,
                }))?;
            } else {
                match &outcome.handled_by {
                    Some(id) => println!("{} handled by {}", path, id),
                    None => println!("{} opened as text", path),
                }
                if !declared_by.is_empty() {
                    println!("  declared by: {}", declared_by.join(", "));
                }
                for button in buttons {
                    println!("  button: {} ({})", button.label, button.owner_extension_id);
                }
            }
        }
        Commands::Install { id } => {
            let report = host.install_extension(&id).await?;
            output_report(&report, cli.json)?;
        }
        Commands::Uninstall { id } => {
            let report = host.uninstall_extension(&id).await?;
            output_report(&report, cli.json)?;
        }
        Commands::Enable { id } => {
            let report = host.set_extension_enabled(&id, true).await?;
            output_report(&report, cli.json)?;
        }
        Commands::Disable { id } => {
            let report = host.set_extension_enabled(&id, false).await?;
            output_report(&report, cli.json)?;
        }
        Commands::Test { dir, keep } => {
            if !dir.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
            let dir = dir.to_string_lossy().to_string();
            let report = host.enter_test_mode(&dir).await?;
            output_report(&report, cli.json)?;
            if !keep {
                host.exit_test_mode().await?;
            }
        }
        Commands::Theme { id } => {
            host.activate_theme(id.as_deref()).await?;
            let snapshot = host.theme_snapshot();
            let selected = snapshot.normal.id().unwrap_or("default").to_string();
            settings.update(|s| s.editor_theme = selected.clone())?;
            if cli.json {
                print_json(&snapshot)?;
            } else {
                println!("Editor theme: {}", selected);
            }
        }
        Commands::Layout { id } => {
            host.activate_ui_layout_theme(id.as_deref()).await?;
            let snapshot = host.theme_snapshot();
            settings.update(|s| s.ui_layout_theme = snapshot.ui_layout.clone())?;
            if cli.json {
                print_json(&snapshot)?;
            } else {
                println!("UI layout theme: {}", snapshot.ui_layout.as_deref().unwrap_or("none"));
            }
        }
        Commands::Controls => {
            host.load_extensions().await?;
            let controls = host.resolve_controls();
            if cli.json {
                print_json(&controls)?;
            } else {
                for control in controls {
                    let mut flags = Vec::new();
                    if control.hidden {
                        flags.push("hidden");
                    }
                    if control.disabled {
                        flags.push("disabled");
                    }
                    println!("{:<12} {:<20} {}", control.id, control.label, flags.join(","));
                }
            }
        }
        Commands::Settings { reset } => {
            let mut shown = if reset { settings.reset()? } else { current };
            if shown.access_token.is_some() {
                shown.access_token = Some("********".to_string());
            }
            print_json(&shown)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(report: &LoadReport) {
    println!(
        "Loaded {} extension(s), skipped {}, failed {}",
        report.loaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {}: {}", failure.bundle, failure.error);
    }
}

fn output_report(report: &LoadReport, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(report)
    } else {
        print_report(report);
        Ok(())
    }
}
