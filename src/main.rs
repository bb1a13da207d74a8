//! wg-utils main entry point
//!
//! This binary is a thin front-end over the library: it loads settings,
//! sets up logging and maps each subcommand onto a config, peer or tool
//! operation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wg_utils::platform::{detect_environment, install_instructions};
use wg_utils::settings::Settings;
use wg_utils::wireguard::{FileStore, InitOptions, NewPeer, PeerManager, PrivateKey, WgTools};
use wg_utils::{APP_NAME, VERSION};

/// Peers with a handshake newer than this are shown as active
const ACTIVE_HANDSHAKE_AGE: Duration = Duration::from_secs(180);

/// WireGuard configuration and peer provisioning utilities
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version = VERSION, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file path (defaults to $WG_UTILS_CONFIG or /etc/wg-utils/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a fresh server configuration
    Init {
        /// Server private key; generated with `wg genkey` when omitted
        #[arg(long)]
        private_key: Option<String>,

        /// UDP listen port
        #[arg(long, default_value_t = 51820)]
        listen_port: u16,

        /// Outbound interface used by the NAT rules
        #[arg(long, default_value = "eth0")]
        nat_interface: String,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Add a peer, allocating an address unless --allowed-ips is given
    AddPeer {
        /// Peer public key
        public_key: String,

        /// Explicit AllowedIPs (comma-separated CIDRs)
        #[arg(long)]
        allowed_ips: Option<String>,

        /// Preshared key
        #[arg(long, conflicts_with = "generate_psk")]
        preshared_key: Option<String>,

        /// Generate a preshared key with `wg genpsk`
        #[arg(long)]
        generate_psk: bool,

        /// PersistentKeepalive in seconds
        #[arg(long)]
        keepalive: Option<u16>,

        /// Peer endpoint (host:port)
        #[arg(long)]
        endpoint: Option<String>,

        /// Applications allowed through the tunnel
        #[arg(long)]
        allowed_apps: Option<String>,

        /// Apply the change to the running interface
        #[arg(long)]
        sync: bool,
    },

    /// Remove a peer by public key
    DeletePeer {
        /// Peer public key
        public_key: String,

        /// Apply the change to the running interface
        #[arg(long)]
        sync: bool,
    },

    /// List configured peers
    List,

    /// Show runtime peer status from `wg show`
    Show,

    /// Generate a key pair
    Genkey,

    /// Generate a preshared key
    Genpsk,

    /// Print the server public key derived from the configuration
    Pubkey,

    /// Bring the interface up
    Up,

    /// Bring the interface down
    Down,

    /// Apply the configuration to the running interface
    Sync,

    /// Check whether WireGuard tools are installed
    Check,

    /// Install WireGuard tools with the system package manager
    Install {
        /// Reinstall even if the tools are present
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    debug!("Starting {} v{}", APP_NAME, VERSION);

    // Execute command
    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize structured logging with tracing
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Results go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print a value as JSON or through its text rendering
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

/// Run the CLI command
async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let config_path = settings.config_path();
    debug!("Managing {:?} for interface {}", config_path, settings.interface);

    let tools = WgTools::new(settings.executor())
        .with_binaries(&settings.tools.wg, &settings.tools.wg_quick);
    let manager = PeerManager::new(FileStore::new(&config_path))
        .with_allocator(settings.allocator()?)
        .with_duplicate_policy(settings.duplicate_policy());
    let json = cli.json;

    match cli.command {
        Commands::Init {
            private_key,
            listen_port,
            nat_interface,
            force,
        } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists, use --force to overwrite it",
                    config_path.display()
                );
            }

            let private_key = match private_key {
                Some(key) => PrivateKey::new(&key),
                None => tools.generate_keys().await?.private,
            };

            let allocator = settings.allocator()?;
            let options = InitOptions {
                address: allocator.server(),
                prefix_len: settings.prefix_len()?,
                listen_port,
                nat_interface,
                ..InitOptions::new(private_key.expose())
            };
            manager.init_config(&options).await?;

            let public_key = tools.public_key(&private_key).await?;
            emit(
                json,
                &serde_json::json!({
                    "path": config_path,
                    "publicKey": public_key,
                }),
                || format!("Wrote {}\nServer public key: {}", config_path.display(), public_key),
            )
        }

        Commands::AddPeer {
            public_key,
            allowed_ips,
            preshared_key,
            generate_psk,
            keepalive,
            endpoint,
            allowed_apps,
            sync,
        } => {
            let preshared_key = if generate_psk {
                Some(tools.generate_preshared_key().await?.expose().to_string())
            } else {
                preshared_key
            };

            let peer = NewPeer {
                public_key,
                allowed_ips,
                preshared_key,
                persistent_keepalive: keepalive,
                endpoint,
                allowed_apps,
            };
            let added = manager.add_peer(peer).await?;

            if sync || settings.sync_after_change {
                tools.sync_config(&settings.interface).await?;
            }
            emit(json, &added, || added.ip.clone())
        }

        Commands::DeletePeer { public_key, sync } => {
            let removed = manager.delete_peer(&public_key).await?;
            if removed && (sync || settings.sync_after_change) {
                tools.sync_config(&settings.interface).await?;
            }
            emit(json, &serde_json::json!({ "deleted": removed }), || {
                if removed {
                    format!("Deleted peer {}", public_key)
                } else {
                    format!("Peer {} not found", public_key)
                }
            })
        }

        Commands::List => {
            let peers = manager.list_peers().await?;
            emit(json, &peers, || {
                peers
                    .iter()
                    .map(|peer| {
                        format!(
                            "{}\t{}",
                            peer.public_key().unwrap_or("-"),
                            peer.allowed_ips().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }

        Commands::Show => {
            let status = tools.show(&settings.interface).await?;
            emit(json, &status, || {
                status
                    .iter()
                    .map(|peer| {
                        format!(
                            "{}\t{}\t{}\t{}",
                            peer.public_key,
                            peer.endpoint.as_deref().unwrap_or("-"),
                            peer.latest_handshake.as_deref().unwrap_or("never"),
                            if peer.handshake_within(ACTIVE_HANDSHAKE_AGE) {
                                "active"
                            } else {
                                "inactive"
                            }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }

        Commands::Genkey => {
            let pair = tools.generate_keys().await?;
            emit(json, &pair, || {
                format!(
                    "PrivateKey = {}\nPublicKey = {}",
                    pair.private.expose(),
                    pair.public
                )
            })
        }

        Commands::Genpsk => {
            let psk = tools.generate_preshared_key().await?;
            emit(
                json,
                &serde_json::json!({ "presharedKey": psk.expose() }),
                || psk.expose().to_string(),
            )
        }

        Commands::Pubkey => {
            let public_key = tools.public_key_from_config(&manager).await?;
            emit(json, &serde_json::json!({ "publicKey": public_key }), || {
                public_key.clone()
            })
        }

        Commands::Up => {
            tools.up(&settings.interface).await?;
            Ok(())
        }

        Commands::Down => {
            tools.down(&settings.interface).await?;
            Ok(())
        }

        Commands::Sync => {
            tools.sync_config(&settings.interface).await?;
            Ok(())
        }

        Commands::Check => {
            let available = tools.is_available().await;
            let platform = detect_environment(tools.executor()).await;
            let instructions = install_instructions(&platform);
            emit(
                json,
                &serde_json::json!({
                    "installed": available,
                    "platform": platform,
                    "install": instructions,
                }),
                || {
                    let mut text = format!(
                        "WireGuard tools: {}\nPlatform: {}",
                        if available { "installed" } else { "not installed" },
                        platform.description()
                    );
                    if let (false, Some(command)) = (available, &instructions.command) {
                        text.push_str(&format!("\nInstall with: {}", command));
                    }
                    text
                },
            )?;
            if !available {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Install { force } => {
            if tools.install_wireguard(force).await? {
                info!("WireGuard tools installed");
            }
            Ok(())
        }
    }
}
