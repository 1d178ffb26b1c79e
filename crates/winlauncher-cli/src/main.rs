mod config;
mod error;
mod logging;
mod properties;
mod resource_header;

use std::error::Error as _;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use winlauncher_core::{GenerationReport, LauncherGenerator};

use crate::config::LauncherConfig;
use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(
    name = "launcher-generator",
    version,
    about = "Stamp product strings, icon and version info onto a Windows launcher template"
)]
pub struct Cli {
    /// Launcher template executable
    template: PathBuf,
    /// C header with `#define NAME NUMBER` resource IDs
    resource_header: PathBuf,
    /// Properties file: IDS_* keys go to the string table, the rest to version info
    properties: PathBuf,
    /// Application icon (.ico)
    icon: PathBuf,
    /// Output executable, replaced if it exists
    output: PathBuf,
    /// Splash screen bitmap stored under IDB_SPLASH
    #[arg(long)]
    splash: Option<PathBuf>,
    /// Log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures.
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    logging::init_logging(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("Error: {err}");
        let mut cause = err.source();
        while let Some(inner) = cause {
            eprintln!("  caused by: {inner}");
            cause = inner.source();
        }
        std::process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = LauncherConfig::from_cli(cli)?;

    println!("launcher-generator v{}", env!("CARGO_PKG_VERSION"));
    println!("Template: {}", config.template.display());
    println!("Output:   {}", config.output.display());

    let report = generate(&config)?;
    println!(
        "[+] Wrote {} ({} bytes, {} sections)",
        report.output.display(),
        report.size,
        report.sections.len()
    );
    Ok(())
}

fn generate(config: &LauncherConfig) -> winlauncher_core::Result<GenerationReport> {
    let mut generator = LauncherGenerator::load(&config.template)?;

    for (id, value) in &config.strings {
        generator.set_resource_string(*id, value)?;
    }
    println!("[*] String table: {} entries", config.strings.len());

    for (key, value) in &config.version_strings {
        generator.set_version_info_string(key, value)?;
    }
    if let Some(version) = config.file_version {
        generator.set_file_version_number(version)?;
    }
    generator.set_product_version_number(config.product_version)?;
    println!(
        "[*] Version info: {} strings, product version {}",
        config.version_strings.len(),
        config.product_version.map(|p| p.to_string()).join(".")
    );

    let ids = generator.inject_icon(&fs::read(&config.icon)?, config.icon_id)?;
    println!("[*] Icon: {} images in group {}", ids.len(), config.icon_id);

    if let Some(splash) = &config.splash {
        generator.inject_bitmap(splash.id, &fs::read(&splash.path)?)?;
        println!("[*] Splash bitmap: {}", splash.path.display());
    }

    generator.generate(&config.output)
}
