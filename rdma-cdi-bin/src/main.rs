//! Command-line interface for rdma-cdi

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use log::{warn, LevelFilter};
use prettytable::{Cell, Row, Table};

use rdma_cdi::cdi::{self, DEFAULT_OUTPUT_DIR, DEFAULT_PREFIX};
use rdma_cdi::doctor::{CheckResult, Doctor, Report, Severity};
use rdma_cdi::utils::derive_default_name;
use rdma_cdi::{DeviceDiscoverer, RdmaDevice, SysfsDiscoverer};

#[derive(Parser)]
#[command(name = "rdma-cdi")]
#[command(version = rdma_cdi::VERSION)]
#[command(
    about = "RDMA CDI spec generator",
    long_about = "Discover RDMA devices and generate CDI (Container Device Interface) spec files for them."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RDMA_CDI_LOG", default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate CDI spec files for RDMA devices
    #[command(group(ArgGroup::new("target").required(true).args(["all", "pci", "ifname"])))]
    Generate {
        /// Generate specs for all discovered RDMA devices
        #[arg(long)]
        all: bool,

        /// PCI BDF address (e.g. 0000:86:00.0)
        #[arg(long)]
        pci: Option<String>,

        /// Network interface name (e.g. ib0)
        #[arg(long)]
        ifname: Option<String>,

        /// CDI resource prefix
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,

        /// CDI resource name (derived from the target if omitted)
        #[arg(long, conflicts_with = "all")]
        name: Option<String>,

        /// Output directory for CDI spec files
        #[arg(long, env = "RDMA_CDI_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Spec file format
        #[arg(long, default_value = "yaml", value_parser = ["json", "yaml"])]
        format: String,
    },

    /// Discover RDMA devices and their character device mappings
    Discover {
        #[command(flatten)]
        target: Target,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Run environment diagnostics for RDMA device readiness
    Doctor {
        #[command(flatten)]
        target: Target,

        /// Exit non-zero on warnings
        #[arg(long)]
        strict: bool,

        /// Show passed checks in output
        #[arg(long)]
        show_pass: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Remove CDI spec files created by this tool
    Cleanup {
        /// CDI resource prefix to match
        #[arg(long, default_value = DEFAULT_PREFIX)]
        prefix: String,

        /// CDI resource name to match (all if omitted)
        #[arg(long, default_value = "")]
        name: String,

        /// CDI spec directory
        #[arg(long, env = "RDMA_CDI_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Preview files that would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Print version information
    Version,
}

/// Device selection shared by `discover` and `doctor`; all devices by default
#[derive(Args)]
struct Target {
    /// Use all RDMA devices on the host
    #[arg(long)]
    all: bool,

    /// PCI BDF address
    #[arg(long, conflicts_with = "ifname")]
    pci: Option<String>,

    /// Network interface name
    #[arg(long)]
    ifname: Option<String>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .format_timestamp(None)
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Generate {
            all,
            pci,
            ifname,
            prefix,
            name,
            output_dir,
            format,
        } => {
            let discoverer = SysfsDiscoverer::new();

            if all {
                let devices = discoverer
                    .discover_all()
                    .context("device discovery failed")?;
                let written = cdi::generate_per_device(&prefix, &devices, &output_dir, &format)?;
                for path in written {
                    println!("CDI spec written to {}", path.display());
                }
                return Ok(ExitCode::SUCCESS);
            }

            let pci = pci.unwrap_or_default();
            let ifname = ifname.unwrap_or_default();
            let name = name.unwrap_or_else(|| derive_default_name(&pci, &ifname));

            let dev = if pci.is_empty() {
                discoverer.discover_by_ifname(&ifname)
            } else {
                discoverer.discover_by_pci(&pci)
            }
            .context("device discovery failed")?;

            let path = cdi::create_cdi_spec(&prefix, &name, &[dev], &output_dir, &format)
                .context("CDI spec generation failed")?;
            println!("CDI spec written to {}", path.display());
        }

        Commands::Discover { target, output } => {
            let devices = select_devices(&target).context("discovery failed")?;
            match output {
                OutputFormat::Table => print_devices_table(&devices),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
            }
        }

        Commands::Doctor {
            target,
            strict,
            show_pass,
            output,
        } => {
            let mut devices = select_devices(&target).context("device discovery failed")?;
            let report = Doctor::new().diagnose_all(&mut devices);
            let shown = report.filtered(show_pass);

            match output {
                OutputFormat::Table => print_report_table(&shown),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(shown.results())?)
                }
            }

            if report.has_fail() || (strict && report.has_warn()) {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Cleanup {
            prefix,
            name,
            output_dir,
            dry_run,
        } => {
            let removed = cdi::cleanup_specs(&output_dir, &prefix, &name, dry_run)?;
            if removed.is_empty() {
                println!("No matching spec files found.");
            }
            let action = if dry_run { "Would remove" } else { "Removed" };
            for path in removed {
                println!("{action}: {}", path.display());
            }
        }

        Commands::Version => {
            println!("rdma-cdi v{}", rdma_cdi::version());
            println!("RDMA device discovery and CDI spec generation");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn select_devices(target: &Target) -> rdma_cdi::Result<Vec<RdmaDevice>> {
    let discoverer = SysfsDiscoverer::new();

    if target.all && (target.pci.is_some() || target.ifname.is_some()) {
        warn!("--all ignored because --pci or --ifname was specified");
    }

    match (&target.pci, &target.ifname) {
        (Some(pci), _) => Ok(vec![discoverer.discover_by_pci(pci)?]),
        (None, Some(ifname)) => Ok(vec![discoverer.discover_by_ifname(ifname)?]),
        (None, None) => discoverer.discover_all(),
    }
}

fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    value.unwrap_or(placeholder).to_string()
}

fn print_devices_table(devices: &[RdmaDevice]) {
    let mut table = Table::new();

    table.add_row(Row::new(vec![
        Cell::new("PCI ADDRESS"),
        Cell::new("INTERFACE"),
        Cell::new("DRIVER"),
        Cell::new("LINK TYPE"),
        Cell::new("DEVICES"),
    ]));

    for dev in devices {
        table.add_row(Row::new(vec![
            Cell::new(&dev.pci_address),
            Cell::new(&or_placeholder(dev.interface_name.as_deref(), "(none)")),
            Cell::new(&or_placeholder(dev.driver.as_deref(), "(unknown)")),
            Cell::new(&or_placeholder(dev.link_type.as_deref(), "(unknown)")),
            Cell::new(&dev.char_device_paths.join(", ")),
        ]));
    }

    table.printstd();
}

fn status(result: &CheckResult) -> String {
    let marker = match result.severity {
        Severity::Pass => "✓",
        Severity::Warn => "!",
        Severity::Fail => "✗",
    };
    format!("{marker} {}", result.severity)
}

fn print_report_table(report: &Report) {
    if report.results().is_empty() {
        println!("All checks passed.");
        return;
    }

    let mut table = Table::new();

    table.add_row(Row::new(vec![
        Cell::new("STATUS"),
        Cell::new("CHECK"),
        Cell::new("DEVICE"),
        Cell::new("MESSAGE"),
    ]));

    for result in report.results() {
        table.add_row(Row::new(vec![
            Cell::new(&status(result)),
            Cell::new(&result.check),
            Cell::new(&or_placeholder(result.device.as_deref(), "(host)")),
            Cell::new(&result.message),
        ]));
    }

    table.printstd();
}
