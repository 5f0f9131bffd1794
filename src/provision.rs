//! The provisioning pipeline: idempotent create-or-skip for networks and
//! VMs, and the admin-first bring-up sequence.

use anyhow::{Context, Result};
use tracing::info;

use crate::backend::{Backend, Lookup};
use crate::cluster::{Cluster, Network, Node};
use crate::definition;
use crate::image;
use crate::naming::MacAllocator;
use crate::probe::{self, ProbeOpts};
use crate::ui;

/// What happened to one managed object. There is no update path: an object
/// either gets created or is left exactly as the hypervisor has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Skipped,
}

/// Create a network unless the backend already has one by that name.
pub fn ensure_network(backend: &dyn Backend, net: &Network) -> Result<Outcome> {
    if backend.lookup_network(&net.name)? == Lookup::Found {
        ui::info(&format!("Network '{}' already exists", net.name));
        return Ok(Outcome::Skipped);
    }

    let xml = definition::network_xml(net)?;
    ui::action(&format!("Creating network {}", net.name), || {
        backend.create_network(&xml)
    })?;
    Ok(Outcome::Created)
}

/// Create and start a VM unless the backend already has one by that name.
///
/// Attached networks are created first, then backing images (existing files
/// are kept), then the domain definition is submitted. A skip allocates
/// nothing and submits nothing.
pub fn launch_vm(
    backend: &dyn Backend,
    cluster: &Cluster,
    node: &Node,
    macs: &mut MacAllocator,
) -> Result<Outcome> {
    info!(vm = %node.name, "starting vm");
    if backend.lookup_vm(&node.name)? == Lookup::Found {
        ui::info(&format!("VM '{}' already exists", node.name));
        return Ok(Outcome::Skipped);
    }

    for net_name in &node.networks {
        let net = cluster
            .networks
            .get(net_name)
            .with_context(|| format!("node '{}' references unknown network '{}'", node.name, net_name))?;
        ensure_network(backend, net)?;
    }

    for disk in definition::disk_layout(node, &cluster.images_path)? {
        image::ensure_image(&disk.path, &disk.size)?;
    }

    let xml = definition::domain_xml(node, &cluster.images_path, macs)?;
    ui::action(&format!("Creating VM {}", node.name), || {
        backend.create_vm(&xml)
    })?;
    Ok(Outcome::Created)
}

/// Bring up the whole cluster: admin node first, then every worker once the
/// admin node reports a finished installation. The first failure aborts the
/// remaining work; nothing already created is rolled back.
pub fn provision(backend: &dyn Backend, cluster: &Cluster, opts: &ProbeOpts) -> Result<()> {
    provision_with(backend, cluster, |admin| probe::wait_admin_ready(admin, opts))
}

/// `provision` with the admin readiness wait injected, so the sequencing is
/// testable without a live admin node.
pub fn provision_with<F>(backend: &dyn Backend, cluster: &Cluster, mut wait_ready: F) -> Result<()>
where
    F: FnMut(&Node) -> Result<()>,
{
    let mut macs = MacAllocator::new();

    // The admin node installs itself from its attached media; offering
    // network boot would race its own PXE service.
    let mut admin = cluster.admin.clone();
    admin.boot_network = false;

    launch_vm(backend, cluster, &admin, &mut macs)?;
    wait_ready(&admin)?;

    for node in cluster.workers.values() {
        launch_vm(backend, cluster, node, &mut macs)?;
    }
    Ok(())
}
