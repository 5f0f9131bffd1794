//! Renders libvirt object definitions from topology entities. Pure: no I/O
//! beyond the templates embedded at compile time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tera::Tera;

use crate::cluster::{Network, Node, memory_parts};
use crate::naming::{self, MacAllocator};

static NETWORK_TEMPLATE: &str = include_str!("../templates/network.xml.tera");
static DOMAIN_TEMPLATE: &str = include_str!("../templates/domain.xml.tera");

fn render(name: &str, template: &str, ctx: &tera::Context) -> Result<String> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_template(name, template)
        .with_context(|| format!("invalid {} template", name))?;
    tera.render(name, ctx)
        .with_context(|| format!("failed to render {}", name))
}

/// Network definition XML. The forward clause is present only for networks
/// carrying the NAT attribute; everything else stays isolated.
pub fn network_xml(net: &Network) -> Result<String> {
    let mut ctx = tera::Context::new();
    ctx.insert("name", &net.name);
    ctx.insert("bridge", &net.bridge);
    ctx.insert("address", &net.address);
    ctx.insert("netmask", &naming::netmask(net.prefix));
    ctx.insert("nat", &net.is_nat());
    render("network.xml", NETWORK_TEMPLATE, &ctx)
}

/// A disk to attach: device slot, backing image path, image capacity.
#[derive(Debug, Clone, Serialize)]
pub struct DiskPlan {
    pub device: String,
    pub path: PathBuf,
    pub size: String,
}

/// Device slots and backing image paths for a node's disks, in `disks`
/// order. The cdrom, when present, takes the slot after the last disk.
pub fn disk_layout(node: &Node, images_dir: &Path) -> Result<Vec<DiskPlan>> {
    if node.disks.len() + usize::from(node.iso.is_some()) > naming::DEVICE_SLOTS {
        bail!(
            "node '{}' needs more than {} device slots",
            node.name,
            naming::DEVICE_SLOTS
        );
    }

    Ok(node
        .disks
        .iter()
        .enumerate()
        .map(|(slot, size)| {
            let device = naming::disk_device(slot);
            DiskPlan {
                path: images_dir.join(format!("{}_{}.qcow2", node.name, device)),
                device,
                size: size.clone(),
            }
        })
        .collect())
}

#[derive(Serialize)]
struct CdromPlan {
    device: String,
    path: PathBuf,
}

#[derive(Serialize)]
struct IfacePlan {
    mac: String,
    network: String,
}

/// Domain definition XML for a node, allocating a MAC per attached network.
pub fn domain_xml(node: &Node, images_dir: &Path, macs: &mut MacAllocator) -> Result<String> {
    let (mem, mem_unit) = memory_parts(&node.name, &node.memory)?;
    let disks = disk_layout(node, images_dir)?;

    let cdrom = node.iso.as_ref().map(|iso| CdromPlan {
        device: naming::disk_device(disks.len()),
        path: iso.clone(),
    });

    let interfaces: Vec<IfacePlan> = node
        .networks
        .iter()
        .map(|network| IfacePlan {
            mac: macs.allocate(),
            network: network.clone(),
        })
        .collect();

    let mut ctx = tera::Context::new();
    ctx.insert("name", &node.name);
    ctx.insert("mem", &mem);
    ctx.insert("mem_unit", &mem_unit);
    ctx.insert("cpus", &node.cpus);
    ctx.insert("disks", &disks);
    ctx.insert("cdrom", &cdrom);
    ctx.insert("interfaces", &interfaces);
    ctx.insert("boot_cdrom", &cdrom.is_some());
    ctx.insert("boot_network", &node.boot_network);
    render("domain.xml", DOMAIN_TEMPLATE, &ctx)
}
