//! `tessera` — manage applications on a secure element

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tessera_apdu_core::Device;
use tessera_client::manifest;
use tessera_client::peer::{DEFAULT_HSM_KEY, DEFAULT_HSM_URL};
use tessera_client::types::{flags_to_string, get_device_name};
use tessera_client::DeviceClient;
use tessera_transport::{open_first_device, FileSink};

mod config;

#[derive(Parser)]
#[command(version, about = "Manage applications on a secure element")]
struct Cli {
    /// Display exchanged APDUs
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the client key configuration
    #[arg(long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed applications
    List {
        /// List through a remote server instead of a local secure channel
        #[arg(long)]
        remote: bool,

        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Install an application from its manifest
    Install {
        /// Path to the application manifest (TOML, or legacy JSON)
        manifest: PathBuf,

        /// Delete any app with the same name before loading
        #[arg(short, long)]
        force: bool,

        /// Dump the installation APDUs to a file instead of a device
        #[arg(short, long, value_name = "FILE", num_args = 0..=1, default_missing_value = "out.apdu")]
        offline: Option<PathBuf>,
    },

    /// Delete an application
    Delete {
        /// Application name, or its hex content hash with --by-hash
        app: String,

        /// Delete by application hash instead of name
        #[arg(long)]
        by_hash: bool,

        /// Dump the delete APDUs to a file instead of a device
        #[arg(short, long, value_name = "FILE", num_args = 0..=1, default_missing_value = "out_delete.apdu")]
        offline: Option<PathBuf>,
    },

    /// Run an installed application
    Run {
        /// Application name
        app_name: String,
    },

    /// Display device information
    Info,

    /// Display device memory usage
    Meminfo,

    /// Install a custom certificate authority on the device
    InstallCa {
        /// Name of the certificate authority
        name: String,

        /// Uncompressed public key in hex; the client key when omitted
        public_key: Option<String>,
    },

    /// Delete the custom certificate authority
    DeleteCa,

    /// Check whether the device is genuine
    GenuineCheck {
        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Create a device endorsement
    Endorse {
        /// Endorsement key slot (1 or 2)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        key_id: u8,

        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Upgrade the device firmware from a remote server
    UpgradeFirmware {
        /// Firmware name on the server
        firmware_name: String,

        /// Firmware key on the server
        firmware_key: String,

        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Install an application from a remote server
    RemoteInstall {
        /// Application path on the server
        app_path: String,

        /// Application key path on the server
        key_path: String,

        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Delete an application using a remote server
    RemoteDelete {
        /// Application path on the server
        app_path: String,

        /// Application key path on the server
        key_path: String,

        /// Server URL
        #[arg(long, default_value = DEFAULT_HSM_URL)]
        url: String,

        /// Key identifier on the remote server
        #[arg(short, long, default_value = DEFAULT_HSM_KEY)]
        key: String,
    },

    /// Send raw APDUs from a file, one hex line at a time
    Send {
        /// File of hex-encoded APDUs
        input_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => config::default_config_dir()?,
    };
    let private_key = config::load_private_key(&config_dir)?;

    let connect = || -> Result<DeviceClient<Box<dyn Device>>> {
        let device = open_first_device().context("no device available")?;
        Ok(DeviceClient::with_private_key(device, private_key.clone()))
    };
    let file_client = |path: &PathBuf, target_id: u32| -> Result<DeviceClient<Box<dyn Device>>> {
        let out = File::create(path)
            .with_context(|| format!("unable to open {} for dump", path.display()))?;
        println!("Dumping APDUs to {}", path.display());
        let sink: Box<dyn Device> = Box::new(FileSink::new(Box::new(out), target_id));
        Ok(DeviceClient::with_private_key(sink, private_key.clone()))
    };

    match cli.command {
        Commands::List { remote, url, key } => {
            let mut client = connect()?;
            // Targets without custom secure channel support are listed
            // through the remote server
            let remote = remote || client.target_id()? == 0x33000004;
            let apps = if remote {
                client.list_apps_remote(&url, &key)?
            } else {
                client.list_apps()?
            };

            if apps.is_empty() {
                println!("There is no application on the device.");
            } else {
                println!(
                    "{:<16} {:<40} {:<64} {:<64}",
                    "Name", "Flags", "Code/data hash", "Full hash"
                );
                for app in apps {
                    println!(
                        "{:<16} {:<40} {:<64} {:<64}",
                        app.name,
                        flags_to_string(app.flags),
                        hex::encode(app.code_data_hash),
                        hex::encode(app.full_hash)
                    );
                }
            }
        }

        Commands::Install {
            manifest: manifest_path,
            force,
            offline,
        } => {
            let manifest = manifest::from_file(&manifest_path)?;
            let mut client = match &offline {
                Some(path) => {
                    let target_id = *manifest
                        .targets()
                        .first()
                        .context("manifest names no target")?;
                    file_client(path, target_id)?
                }
                None => connect()?,
            };

            if force {
                // A clean retry needs the previous instance gone
                let _ = client.delete_app_by_name(manifest.app_name()?);
            }
            match client.install_app(manifest.as_ref()) {
                Ok(()) => println!("Application installed."),
                Err(e) => match e.status_word().map(u16::from) {
                    Some(0x6985) => bail!("Operation has been canceled by the user."),
                    Some(0x6A80) => {
                        bail!("An application with the same name is already installed.")
                    }
                    Some(0x6A81) => bail!("Application is already installed."),
                    _ => return Err(e.into()),
                },
            }
        }

        Commands::Delete {
            app,
            by_hash,
            offline,
        } => {
            let mut client = match &offline {
                Some(path) => file_client(path, 0x33000004)?,
                None => connect()?,
            };
            let result = if by_hash {
                let hash = hex::decode(&app).context("hash is not valid hex")?;
                client.delete_app_by_hash(&hash)
            } else {
                client.delete_app_by_name(&app)
            };
            match result {
                Ok(()) => println!("Application deleted."),
                Err(e) if e.status_word().map(u16::from) == Some(0x6985) => {
                    bail!("Operation has been canceled by the user.")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Run { app_name } => {
            let mut client = connect()?;
            match client.run_app(&app_name) {
                Ok(()) => {}
                Err(e) if e.status_word().map(u16::from) == Some(0x6984) => {
                    bail!("Application {app_name} is not installed.")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Info => {
            let mut client = connect()?;
            let info = client.get_version_info()?;
            println!(
                "Device: {} ({:#010x})",
                get_device_name(info.target_id),
                info.target_id
            );
            println!("SE version: {}", info.se_version);
            println!("MCU version: {}", info.mcu_version);
            if info.is_onboarded() {
                println!("Device is onboarded.");
            }
            if info.is_recovery_mode() {
                println!("Device is running in RECOVERY mode.");
            }
        }

        Commands::Meminfo => {
            let mut client = connect()?;
            let info = client.get_memory_info()?;
            let total = info.total_size();
            let entry = |name: &str, size: u32| {
                println!(
                    "- {}: {} ({:.2}%)",
                    name,
                    format_size(size),
                    size as f64 / total as f64 * 100.0
                );
            };
            println!("Memory usage:");
            entry("System", info.system_size);
            entry("Applications", info.applications_size);
            entry("Available space", info.free_size);
            println!();
            println!(
                "Installed apps: {} (max: {})",
                info.used_app_slots, info.num_app_slots
            );
        }

        Commands::InstallCa { name, public_key } => {
            let public_key = match public_key {
                Some(hex_key) => hex::decode(&hex_key).context("public key is not valid hex")?,
                None => private_key.public_key().serialize(),
            };
            let mut client = connect()?;
            match client.install_ca(&name, &public_key) {
                Ok(()) => println!("Custom certificate has been successfully installed."),
                Err(e) => match e.status_word().map(u16::from) {
                    Some(0x6982) => bail!("A certificate is already installed on the device."),
                    Some(0x6802) => bail!("The provided certificate is invalid."),
                    _ => return Err(e.into()),
                },
            }
        }

        Commands::DeleteCa => {
            let mut client = connect()?;
            match client.delete_ca() {
                Ok(()) => println!("Custom certificate has been deleted."),
                Err(e) if e.status_word().map(u16::from) == Some(0x6A84) => {
                    bail!("No custom certificate is installed. There is nothing to delete.")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::GenuineCheck { url, key } => {
            let mut client = connect()?;
            if client.genuine_check(&url, &key)? {
                println!("Device is genuine.");
            } else {
                println!("Device is NOT genuine.");
            }
        }

        Commands::Endorse { key_id, url, key } => {
            let mut client = connect()?;
            client.endorse(key_id, &url, &key)?;
            println!("Endorsement committed.");
        }

        Commands::UpgradeFirmware {
            firmware_name,
            firmware_key,
            url,
            key,
        } => {
            let mut client = connect()?;
            client.upgrade_firmware(&firmware_name, &firmware_key, &url, &key)?;
        }

        Commands::RemoteInstall {
            app_path,
            key_path,
            url,
            key,
        } => {
            let mut client = connect()?;
            client.install_remote_app(&app_path, &key_path, &url, &key)?;
        }

        Commands::RemoteDelete {
            app_path,
            key_path,
            url,
            key,
        } => {
            let mut client = connect()?;
            client.delete_remote_app(&app_path, &key_path, &url, &key)?;
        }

        Commands::Send { input_file } => {
            let mut client = connect()?;
            let file = File::open(&input_file)
                .with_context(|| format!("cannot open {}", input_file.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let apdu = hex::decode(line).context("input line is not valid hex")?;
                let response = client.raw_exchange(&apdu)?;
                println!("{}", hex::encode(&response));
            }
        }
    }

    Ok(())
}

fn format_size(size: u32) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}GB")
}
