// Entry point: enumerates attached devices, loads a catalog per device,
// admits each into a registry, and serves the result as a read-only
// filesystem at the given mount point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use devicefs::catalog::DeviceCatalog;
use devicefs::device::{self, DeviceInfo};
use devicefs::fs;
use devicefs::registry::FilesystemRegistry;

/// Mount the photo albums of attached devices as a read-only filesystem.
#[derive(Parser)]
#[command(name = "devicefs", version, about, long_about = None)]
struct Cli {
    /// Directory at which to mount the filesystem.
    mount_point: PathBuf,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for log lines.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_logging(cli: &Cli) {
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level),
    );

    if matches!(cli.log_format, LogFormat::Json) {
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{{\"level\":\"{}\",\"target\":\"{}\",\"message\":\"{}\"}}",
                record.level(),
                record.target(),
                record.args()
            )
        });
    }

    builder.init();
}

/// Loads every discovered device into a registry, skipping (with a
/// warning) any device whose catalog fails to construct: device
/// construction failures are per-device and never abort startup.
fn build_registry(devices: Vec<DeviceInfo>) -> FilesystemRegistry {
    let mut registry = FilesystemRegistry::new();

    for device in devices {
        info!("found device {} ({})", device.name, device.uid);

        let db_path = device.photo_db_path();
        let root_path = device.root_path();

        match DeviceCatalog::open(&db_path, &device.name, &root_path) {
            Ok(catalog) => {
                info!(
                    "loaded catalog for '{}': {} album(s)",
                    catalog.device_name(),
                    catalog.album_count()
                );
                registry.add_database(catalog);
            }
            Err(err) => {
                warn!(
                    "skipping device '{}' ({}): {err}",
                    device.name, device.uid
                );
            }
        }
    }

    registry
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
        ) => {
            err.exit();
        }
        Err(err) => {
            eprintln!("{err}");
            // Missing or malformed arguments must exit 1, not clap's
            // default usage-error code of 2.
            std::process::exit(1);
        }
    };
    init_logging(&cli);

    let devices = device::enumerate_devices();
    if devices.is_empty() {
        warn!("no attached devices found; mounting an empty filesystem");
    }

    let registry = Arc::new(build_registry(devices));
    info!(
        "mounting {} device(s) at {}",
        registry.len(),
        cli.mount_point.display()
    );

    if let Err(err) = fs::run(registry, &cli.mount_point) {
        error!("filesystem exited with an error: {err}");
        std::process::exit(1);
    }

    Ok(())
}
