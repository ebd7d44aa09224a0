// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The `clawbox` CLI: argument surface and wiring of the orchestration
//! engine to the real external tools.
//!
//! Every user-facing failure prints its message to stderr and exits 1.
//! The hidden `_watch-vm` subcommand is the watcher child's entrypoint.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use clawbox_adapters::{AnsiblePlaybook, AnsibleRunner, MutagenCli, TartBackend};
use clawbox_core::{Profile, ServiceSelection};
use clawbox_engine::orchestrator::ProvisionOptions;
use clawbox_engine::watcher::WatcherLoopDeps;
use clawbox_engine::{
    EngineContext, LaunchOptions, Orchestrator, ProcessWatcherSupervisor, UpOptions,
    UserFacingError,
};

#[derive(Parser)]
#[command(name = "clawbox", about = "Clawbox macOS VM orchestration", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ProfileArgs {
    /// VM profile
    #[arg(long, value_parser = ["standard", "developer"], default_value = "standard")]
    profile: String,

    /// Shortcut for --profile developer
    #[arg(long, conflicts_with = "standard")]
    developer: bool,

    /// Shortcut for --profile standard
    #[arg(long)]
    standard: bool,
}

impl ProfileArgs {
    fn resolve(&self) -> Profile {
        if self.developer {
            return Profile::Developer;
        }
        if self.standard {
            return Profile::Standard;
        }
        if self.profile == "developer" {
            Profile::Developer
        } else {
            Profile::Standard
        }
    }
}

#[derive(Args)]
struct MountArgs {
    /// Host directory synced as the OpenClaw source tree (developer mode)
    #[arg(long, default_value = "")]
    openclaw_source: String,

    /// Host directory synced as the OpenClaw payload (developer mode)
    #[arg(long, default_value = "")]
    openclaw_payload: String,

    /// Host directory synced as the signal-cli payload (developer mode)
    #[arg(long, default_value = "")]
    signal_cli_payload: String,
}

#[derive(Args)]
struct FeatureArgs {
    #[arg(long)]
    add_playwright_provisioning: bool,

    #[arg(long)]
    add_tailscale_provisioning: bool,

    #[arg(long)]
    add_signal_cli_provisioning: bool,
}

impl FeatureArgs {
    fn selection(&self) -> ServiceSelection {
        ServiceSelection {
            playwright: self.add_playwright_provisioning,
            tailscale: self.add_tailscale_provisioning,
            signal_cli: self.add_signal_cli_provisioning,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a Clawbox VM from the base image
    Create {
        /// VM number (default: 1)
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
    },

    /// Launch a Clawbox VM
    Launch {
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        mounts: MountArgs,
        /// Launch without a VM window
        #[arg(long)]
        headless: bool,
    },

    /// Run provisioning on an existing VM
    Provision {
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        features: FeatureArgs,
        /// Enable signal payload sync mode (manual workflow: launch with
        /// --signal-cli-payload, then provision with this flag)
        #[arg(long)]
        enable_signal_payload: bool,
    },

    /// Create, launch, and provision as needed
    Up {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        number_pos: Option<u32>,
        /// Optional VM number
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        number: Option<u32>,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        mounts: MountArgs,
        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Cleanly recreate a VM (down + delete + up)
    Recreate {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        number_pos: Option<u32>,
        /// Optional VM number
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        number: Option<u32>,
        #[command(flatten)]
        profile: ProfileArgs,
        #[command(flatten)]
        mounts: MountArgs,
        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Stop a running Clawbox VM
    Down {
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
    },

    /// Delete a Clawbox VM and local Clawbox state for that VM
    Delete {
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
    },

    /// Print the VM IP address
    Ip {
        #[arg(value_parser = clap::value_parser!(u32).range(1..), default_value_t = 1)]
        number: u32,
    },

    /// Show status for one VM or the full Clawbox environment
    Status {
        /// Optional VM number (omit to show full environment status)
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        number: Option<u32>,
        #[arg(long)]
        json: bool,
    },

    /// Manage the local macOS base image build
    Image {
        #[command(subcommand)]
        command: ImageCommand,
    },

    /// Watcher child entrypoint (internal)
    #[command(name = "_watch-vm", hide = true)]
    WatchVm {
        vm_name: String,
        #[arg(long)]
        state_dir: PathBuf,
        #[arg(long, default_value_t = 2)]
        poll_seconds: u64,
    },
}

#[derive(Subcommand)]
enum ImageCommand {
    /// Initialize packer plugins for the base image template
    Init,
    /// Build the base image (runs image init first by default)
    Build {
        /// Skip packer init before build
        #[arg(long)]
        skip_init: bool,
    },
    /// Force rebuild the base image (runs image init first by default)
    Rebuild {
        /// Skip packer init before rebuild
        #[arg(long)]
        skip_init: bool,
    },
}

fn resolve_optional_vm_number(
    number_pos: Option<u32>,
    number: Option<u32>,
) -> Result<u32, UserFacingError> {
    match (number_pos, number) {
        (Some(_), Some(_)) => {
            Err(UserFacingError::new("Error: VM number provided more than once"))
        }
        (_, Some(n)) | (Some(n), _) => Ok(n),
        (None, None) => Ok(1),
    }
}

fn up_options(
    number_pos: Option<u32>,
    number: Option<u32>,
    profile: &ProfileArgs,
    mounts: &MountArgs,
    features: &FeatureArgs,
) -> Result<UpOptions, UserFacingError> {
    Ok(UpOptions {
        vm_number: resolve_optional_vm_number(number_pos, number)?,
        profile: profile.resolve(),
        openclaw_source: mounts.openclaw_source.clone(),
        openclaw_payload: mounts.openclaw_payload.clone(),
        signal_payload: mounts.signal_cli_payload.clone(),
        services: features.selection(),
    })
}

fn run_watcher_child(vm_name: &str, state_dir: PathBuf, poll_seconds: u64) {
    let mut ctx = EngineContext::resolve();
    ctx.state_dir = state_dir;
    let backend = TartBackend::default();
    let sync = MutagenCli;
    let deps = WatcherLoopDeps {
        backend: &backend,
        sync: &sync,
        state_dir: &ctx.state_dir,
        ssh_dir: &ctx.ssh_dir,
        lock_root: &ctx.lock_root,
    };
    clawbox_engine::run_watcher_loop(&deps, vm_name, poll_seconds);
}

fn run(command: Command) -> Result<()> {
    if let Command::WatchVm { vm_name, state_dir, poll_seconds } = command {
        run_watcher_child(&vm_name, state_dir, poll_seconds);
        return Ok(());
    }

    let ctx = EngineContext::resolve();
    let backend = TartBackend::default();
    let sync = MutagenCli;
    let shell = AnsibleRunner { context: ctx.remote_shell_context() };
    let provisioner = AnsiblePlaybook;
    let watchers = ProcessWatcherSupervisor;
    let orch = Orchestrator::new(&ctx, &backend, &sync, &shell, &provisioner, &watchers);

    match command {
        Command::Create { number } => orch.create(number)?,
        Command::Launch { number, profile, mounts, headless } => orch.launch(&LaunchOptions {
            vm_number: number,
            profile: profile.resolve(),
            openclaw_source: mounts.openclaw_source,
            openclaw_payload: mounts.openclaw_payload,
            signal_payload: mounts.signal_cli_payload,
            headless,
        })?,
        Command::Provision { number, profile, features, enable_signal_payload } => {
            orch.provision(&ProvisionOptions {
                vm_number: number,
                profile: profile.resolve(),
                services: features.selection(),
                enable_signal_payload,
                sync_already_active: false,
            })?
        }
        Command::Up { number_pos, number, profile, mounts, features } => {
            orch.up(&up_options(number_pos, number, &profile, &mounts, &features)?)?
        }
        Command::Recreate { number_pos, number, profile, mounts, features } => {
            orch.recreate(&up_options(number_pos, number, &profile, &mounts, &features)?)?
        }
        Command::Down { number } => orch.down(number)?,
        Command::Delete { number } => orch.delete(number)?,
        Command::Ip { number } => orch.ip(number)?,
        Command::Status { number: Some(number), json } => orch.status_vm(number, json)?,
        Command::Status { number: None, json } => orch.status_environment(json)?,
        Command::Image { command } => match command {
            ImageCommand::Init => clawbox_engine::image::image_init(&ctx)?,
            ImageCommand::Build { skip_init } => {
                clawbox_engine::image::image_build(&ctx, skip_init, false)?
            }
            ImageCommand::Rebuild { skip_init } => {
                clawbox_engine::image::image_build(&ctx, skip_init, true)?
            }
        },
        Command::WatchVm { .. } => {}
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    // Silent by default: stdout belongs to the user-facing output.
    let filter = EnvFilter::try_from_env("CLAWBOX_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
