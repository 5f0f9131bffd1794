use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::backend::VirshBackend;
use crate::cluster::Cluster;
use crate::config::DEFAULT_LIBVIRT_URL;
use crate::logging;
use crate::probe::ProbeOpts;
use crate::provision;
use crate::ui;

#[derive(Parser)]
#[command(
    name = "fuelkvm",
    version,
    about = "Provision a Fuel virtual cluster on libvirt/KVM"
)]
struct Cli {
    /// Libvirt connection URL
    #[arg(long, default_value = DEFAULT_LIBVIRT_URL)]
    libvirt_url: String,

    /// Give up on each readiness wait after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Cluster description file (YAML)
    description: PathBuf,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    preflight()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let flag = cancel.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let backend = ui::action(
        &format!("Connecting to libvirt at {}", cli.libvirt_url),
        || VirshBackend::connect(&cli.libvirt_url),
    )?;
    let cluster = ui::action(
        &format!("Load cluster description from {}", cli.description.display()),
        || Cluster::load(&cli.description),
    )?;
    ui::info(&format!(
        "Will store images under {}",
        cluster.images_path.display()
    ));

    let opts = ProbeOpts {
        cancel,
        deadline: cli.timeout.map(Duration::from_secs),
    };
    provision::provision(&backend, &cluster, &opts)?;

    ui::success("Cluster provisioned.");
    Ok(())
}

/// Fail early, before touching the hypervisor, if a required external tool
/// is missing.
fn preflight() -> Result<()> {
    for tool in ["virsh", "qemu-img"] {
        which::which(tool)
            .map(|_| ())
            .with_context(|| format!("required tool '{}' not found in PATH", tool))?;
    }
    Ok(())
}
