// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use photobox::backends::camera::{CameraBackendManager, CameraMode};
use photobox::config::Config;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "photobox")]
#[command(about = "Kiosk photo box for DSLRs, webcams and a synthetic camera")]
#[command(version = photobox::constants::app_version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Camera backend (overrides the config file)
    #[arg(short, long, global = true)]
    backend: Option<CameraMode>,

    /// Enable studio mode, copying every photo to the forwarding folder
    #[arg(long, global = true)]
    studio: bool,

    /// Forwarding folder for studio mode (implies --studio)
    #[arg(long, global = true)]
    forward_to: Option<PathBuf>,

    /// Directory for captured photos
    #[arg(long, global = true)]
    photo_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in terminal mode (renders live view to the terminal)
    Terminal,

    /// Print camera status as JSON
    Status,

    /// Take a photo
    Photo {
        /// Output file name or path (default: <photo_dir>/<prefix>_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List settings, show choices for one, or change it
    Settings {
        /// Setting name (iso, aperture, shutterspeed, whitebalance, imageformat)
        name: Option<String>,

        /// New value for the setting
        #[arg(long, requires = "name")]
        set: Option<String>,
    },

    /// Stop desktop services holding the camera's USB connection
    FixUsb {
        /// Also turn off desktop automount for cameras (gsettings)
        #[arg(long)]
        disable_automount: bool,

        /// Also write udev rules for camera access into the temp directory
        #[arg(long)]
        udev_rules: bool,

        /// Also re-enumerate the camera on the USB bus (needs root or usbreset)
        #[arg(long)]
        reset_usb: bool,
    },

    /// Release and re-detect the camera
    Reset,

    /// Switch the DSLR back to manual (PTP) control
    Manual,

    /// Run step-by-step camera diagnostics
    Diagnose,

    /// Print the effective configuration
    Config {
        /// Persist it to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(dir) = &self.photo_dir {
            config.photo_dir = dir.clone();
        }
        if let Some(folder) = &self.forward_to {
            config.forward_folder = Some(folder.clone());
            config.studio_mode = true;
        }
        if self.studio {
            config.studio_mode = true;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, None | Some(Commands::Terminal));
    init_logging(interactive);

    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);

    match cli.command {
        None | Some(Commands::Terminal) => run_terminal(&config),
        Some(Commands::Status) => cli::show_status(&config),
        Some(Commands::Photo { output }) => cli::take_photo(&config, output),
        Some(Commands::Settings { name, set }) => cli::settings(&config, name, set),
        Some(Commands::FixUsb {
            disable_automount,
            udev_rules,
            reset_usb,
        }) => cli::fix_usb(
            &config,
            cli::UsbFixOptions {
                disable_automount,
                udev_rules: udev_rules.then(std::env::temp_dir),
                reset_usb,
            },
        ),
        Some(Commands::Reset) => cli::reset(&config),
        Some(Commands::Manual) => cli::manual(&config),
        Some(Commands::Diagnose) => cli::diagnose(&config),
        Some(Commands::Config { save }) => cli::show_config(&config, save),
    }
}

/// Initialize logging
///
/// Set RUST_LOG environment variable to control log level
/// Examples: RUST_LOG=debug, RUST_LOG=photobox=debug, RUST_LOG=info
/// The terminal viewer owns the screen, so its logs go to a file instead.
fn init_logging(interactive: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    if interactive {
        let log_path =
            std::env::temp_dir().join(format!("{}.log", photobox::constants::APP_NAME));
        if let Ok(file) = std::fs::File::create(&log_path) {
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
            return;
        }
    }
    builder.with_writer(std::io::stderr).init();
}

fn run_terminal(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let camera = CameraBackendManager::initialize(config.backend, config)?;
    photobox::terminal::run(camera)
}
