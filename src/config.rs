use std::time::Duration;

pub const DEFAULT_LIBVIRT_URL: &str = "qemu:///system";

/// Reserved name of the admin node; the `fuel_vm` document section always
/// produces the node with this name.
pub const ADMIN_NODE_NAME: &str = "fuel";

/// Network attribute enabling NAT forwarding.
pub const NAT_ATTR: &str = "NAT";

/// Seed for the per-run MAC allocator (52:54:00 is the QEMU OUI).
pub const MAC_SEED: u64 = 0x5254_00da_7227;

/// Prefix for virtio disk device names (vda, vdb, ...).
pub const DISK_DEV_PREFIX: &str = "vd";

pub const SSH_PORT: u16 = 22;

/// Log written by the admin node while it bootstraps itself.
pub const BOOTSTRAP_LOG: &str = "/var/log/puppet/bootstrap_admin_node.log";

/// Line that appears in the bootstrap log once installation is complete.
pub const BOOTSTRAP_DONE_MARKER: &str = "Finished catalog run";

/// Per-attempt timeout for the TCP reachability probe.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between TCP / SSH probe attempts.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between reads of the bootstrap log.
pub const LOG_POLL_INTERVAL: Duration = Duration::from_secs(10);
