use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::config::{ADMIN_NODE_NAME, NAT_ATTR};

/// Problems in the cluster description document. All of these are fatal and
/// reported before anything talks to the hypervisor.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid cluster description: {0}")]
    Document(#[from] serde_yaml::Error),

    #[error("network '{name}' needs '<bridge> <address>/<prefix> [attr...]', got {got:?}")]
    NetworkSpec { name: String, got: String },

    #[error("network '{name}' has invalid address {got:?} (want <address>/<0-32>)")]
    Cidr { name: String, got: String },

    #[error("cluster entry '{name}' must be '=<node>' to alias another entry, got {got:?}")]
    AliasMarker { name: String, got: String },

    #[error("cluster entry '{name}' aliases unknown entry '{target}'")]
    DanglingAlias { name: String, target: String },

    #[error("cluster entry '{name}' aliases itself")]
    SelfAlias { name: String },

    #[error("cluster entry '{name}' aliases '{target}', which is itself an alias")]
    AliasChain { name: String, target: String },

    #[error("node name '{0}' is reserved for the admin node")]
    ReservedName(String),

    #[error("node '{node}' is attached to unknown network '{network}'")]
    UnknownNetwork { node: String, network: String },

    #[error("node '{node}' has invalid memory size {got:?} (want <number><K|M|G|T>)")]
    MemorySize { node: String, got: String },

    #[error("node '{node}' has invalid ssh_creds {got:?} (want user:password@host)")]
    SshCreds { node: String, got: String },

    #[error("missing global attribute '{0}'")]
    MissingAttr(&'static str),

    #[error("global attribute '{0}' must be a string")]
    AttrType(&'static str),
}

/// A virtual network: bridge device, CIDR address, free-form attributes.
#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub bridge: String,
    pub address: String,
    pub prefix: u8,
    pub attrs: HashSet<String>,
}

impl Network {
    /// Parse the whitespace-delimited parameter string of a `networks` entry:
    /// bridge name, address/prefix, then free-form attributes.
    fn parse(name: &str, params: &str) -> Result<Self, ParseError> {
        let mut tokens = params.split_whitespace();
        let (Some(bridge), Some(cidr)) = (tokens.next(), tokens.next()) else {
            return Err(ParseError::NetworkSpec {
                name: name.to_string(),
                got: params.to_string(),
            });
        };

        let bad_cidr = || ParseError::Cidr {
            name: name.to_string(),
            got: cidr.to_string(),
        };
        let (address, prefix) = cidr.split_once('/').ok_or_else(bad_cidr)?;
        let prefix: u8 = prefix.parse().map_err(|_| bad_cidr())?;
        if address.is_empty() || prefix > 32 {
            return Err(bad_cidr());
        }

        Ok(Self {
            name: name.to_string(),
            bridge: bridge.to_string(),
            address: address.to_string(),
            prefix,
            attrs: tokens.map(str::to_string).collect(),
        })
    }

    pub fn is_nat(&self) -> bool {
        self.attrs.contains(NAT_ATTR)
    }
}

/// Remote-access credentials in `user:password@host` form.
#[derive(Debug, Clone)]
pub struct SshCreds {
    pub user: String,
    pub password: String,
    pub host: String,
}

impl SshCreds {
    fn parse(node: &str, s: &str) -> Result<Self, ParseError> {
        let bad = || ParseError::SshCreds {
            node: node.to_string(),
            got: s.to_string(),
        };
        let (userpass, host) = s.rsplit_once('@').ok_or_else(bad)?;
        let (user, password) = userpass.split_once(':').ok_or_else(bad)?;
        if user.is_empty() || host.is_empty() {
            return Err(bad());
        }
        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
            host: host.to_string(),
        })
    }
}

/// Node parameter block as written in the document. Known keys are explicit
/// fields; anything else lands in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub memory: String,
    pub cpu: u32,
    pub networks: String,
    pub disks: String,
    #[serde(default)]
    pub iso: Option<PathBuf>,
    #[serde(default)]
    pub ssh_creds: Option<String>,
    #[serde(default = "default_boot_network")]
    pub boot_network: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

fn default_boot_network() -> bool {
    true
}

/// A `cluster` section entry: either an inline parameter block or an
/// `=other` reference reusing another entry's block under a new name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ClusterEntry {
    AliasOf(String),
    Direct(NodeSpec),
}

/// One VM to bring up: the admin node or a worker.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub memory: String,
    pub cpus: u32,
    pub networks: Vec<String>,
    pub disks: Vec<String>,
    pub iso: Option<PathBuf>,
    pub ssh_creds: Option<SshCreds>,
    pub boot_network: bool,
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Node {
    fn from_spec(name: &str, spec: NodeSpec) -> Result<Self, ParseError> {
        memory_parts(name, &spec.memory)?;
        let ssh_creds = spec
            .ssh_creds
            .as_deref()
            .map(|s| SshCreds::parse(name, s))
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            memory: spec.memory,
            cpus: spec.cpu,
            networks: spec.networks.split_whitespace().map(str::to_string).collect(),
            disks: spec.disks.split_whitespace().map(str::to_string).collect(),
            iso: spec.iso,
            ssh_creds,
            boot_network: spec.boot_network,
            extra: spec.extra,
        })
    }
}

/// Split a memory size string into magnitude and libvirt unit: "2G" ->
/// ("2", "GiB").
pub fn memory_parts<'a>(node: &str, memory: &'a str) -> Result<(&'a str, &'static str), ParseError> {
    let bad = || ParseError::MemorySize {
        node: node.to_string(),
        got: memory.to_string(),
    };
    if memory.len() < 2 {
        return Err(bad());
    }
    let (magnitude, suffix) = memory.split_at(memory.len() - 1);
    if !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let unit = match suffix {
        "K" => "KiB",
        "M" => "MiB",
        "G" => "GiB",
        "T" => "TiB",
        _ => return Err(bad()),
    };
    Ok((magnitude, unit))
}

/// Raw document shape: three fixed sections plus free-form global attributes.
#[derive(Debug, Deserialize)]
struct ClusterDoc {
    networks: BTreeMap<String, String>,
    fuel_vm: NodeSpec,
    cluster: BTreeMap<String, ClusterEntry>,
    #[serde(flatten)]
    attrs: BTreeMap<String, serde_yaml::Value>,
}

/// The whole topology to provision, built once per run.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub networks: BTreeMap<String, Network>,
    pub admin: Node,
    pub workers: BTreeMap<String, Node>,
    pub images_path: PathBuf,
    pub attrs: BTreeMap<String, serde_yaml::Value>,
}

impl Cluster {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::from_yaml(&text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ParseError> {
        let doc: ClusterDoc = serde_yaml::from_str(text)?;

        let mut networks = BTreeMap::new();
        for (name, params) in &doc.networks {
            networks.insert(name.clone(), Network::parse(name, params)?);
        }

        let admin = Node::from_spec(ADMIN_NODE_NAME, doc.fuel_vm)?;

        let mut workers = BTreeMap::new();
        for (name, entry) in &doc.cluster {
            if name == ADMIN_NODE_NAME {
                return Err(ParseError::ReservedName(name.clone()));
            }
            let spec = resolve_entry(&doc.cluster, name, entry)?;
            workers.insert(name.clone(), Node::from_spec(name, spec)?);
        }

        for node in std::iter::once(&admin).chain(workers.values()) {
            for network in &node.networks {
                if !networks.contains_key(network) {
                    return Err(ParseError::UnknownNetwork {
                        node: node.name.clone(),
                        network: network.clone(),
                    });
                }
            }
        }

        let mut attrs = doc.attrs;
        let images_path = match attrs.remove("images_path") {
            Some(serde_yaml::Value::String(path)) => PathBuf::from(path),
            Some(_) => return Err(ParseError::AttrType("images_path")),
            None => return Err(ParseError::MissingAttr("images_path")),
        };

        Ok(Self {
            networks,
            admin,
            workers,
            images_path,
            attrs,
        })
    }
}

/// Resolve a cluster entry to its parameter block. Aliases are resolved in
/// one pass against the loaded document; an alias must point at a direct
/// entry.
fn resolve_entry(
    entries: &BTreeMap<String, ClusterEntry>,
    name: &str,
    entry: &ClusterEntry,
) -> Result<NodeSpec, ParseError> {
    match entry {
        ClusterEntry::Direct(spec) => Ok(spec.clone()),
        ClusterEntry::AliasOf(marker) => {
            let target = marker.strip_prefix('=').ok_or_else(|| ParseError::AliasMarker {
                name: name.to_string(),
                got: marker.clone(),
            })?;
            if target == name {
                return Err(ParseError::SelfAlias {
                    name: name.to_string(),
                });
            }
            match entries.get(target) {
                Some(ClusterEntry::Direct(spec)) => Ok(spec.clone()),
                Some(ClusterEntry::AliasOf(_)) => Err(ParseError::AliasChain {
                    name: name.to_string(),
                    target: target.to_string(),
                }),
                None => Err(ParseError::DanglingAlias {
                    name: name.to_string(),
                    target: target.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
images_path: /var/lib/libvirt/images
networks:
  net0: "br-net0 10.20.0.1/24 NAT"
  net1: "br-net1 172.16.0.1/24"
fuel_vm:
  memory: 2G
  cpu: 2
  networks: "net0"
  disks: "50G"
  iso: /srv/iso/fuel.iso
  ssh_creds: root:r00tme@10.20.0.2
cluster:
  node1:
    memory: 1G
    cpu: 1
    networks: "net0 net1"
    disks: "20G 30G"
  node2: "=node1"
"#;

    #[test]
    fn test_full_document() {
        let cluster = Cluster::from_yaml(DOC).unwrap();

        assert_eq!(cluster.images_path, PathBuf::from("/var/lib/libvirt/images"));
        assert_eq!(cluster.networks.len(), 2);

        let net0 = &cluster.networks["net0"];
        assert_eq!(net0.bridge, "br-net0");
        assert_eq!(net0.address, "10.20.0.1");
        assert_eq!(net0.prefix, 24);
        assert!(net0.is_nat());
        assert!(!cluster.networks["net1"].is_nat());

        assert_eq!(cluster.admin.name, "fuel");
        assert_eq!(cluster.admin.cpus, 2);
        assert_eq!(cluster.admin.iso.as_deref(), Some(Path::new("/srv/iso/fuel.iso")));
        let creds = cluster.admin.ssh_creds.as_ref().unwrap();
        assert_eq!(creds.user, "root");
        assert_eq!(creds.password, "r00tme");
        assert_eq!(creds.host, "10.20.0.2");
        assert!(cluster.admin.boot_network);

        assert_eq!(cluster.workers.len(), 2);
        let node1 = &cluster.workers["node1"];
        assert_eq!(node1.networks, ["net0", "net1"]);
        assert_eq!(node1.disks, ["20G", "30G"]);
        assert!(node1.boot_network);
        assert!(node1.ssh_creds.is_none());
    }

    #[test]
    fn test_alias_reuses_params_under_new_name() {
        let cluster = Cluster::from_yaml(DOC).unwrap();
        let node2 = &cluster.workers["node2"];
        assert_eq!(node2.name, "node2");
        assert_eq!(node2.memory, "1G");
        assert_eq!(node2.networks, ["net0", "net1"]);
        assert_eq!(node2.disks, ["20G", "30G"]);
    }

    #[test]
    fn test_alias_without_marker_is_rejected() {
        let doc = DOC.replace("\"=node1\"", "\"node1\"");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::AliasMarker { .. }), "{err}");
    }

    #[test]
    fn test_dangling_alias_is_rejected() {
        let doc = DOC.replace("=node1", "=ghost");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::DanglingAlias { .. }), "{err}");
    }

    #[test]
    fn test_self_alias_is_rejected() {
        let doc = DOC.replace("node2: \"=node1\"", "node2: \"=node2\"");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::SelfAlias { .. }), "{err}");
    }

    #[test]
    fn test_alias_to_alias_is_rejected() {
        let doc = format!("{}  node3: \"=node2\"\n", DOC);
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::AliasChain { .. }), "{err}");
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let doc = DOC.replace("fuel_vm:", "fuel_vm_typo:");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::Document(_)), "{err}");
    }

    #[test]
    fn test_short_network_spec_is_rejected() {
        let doc = DOC.replace("br-net1 172.16.0.1/24", "br-net1");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::NetworkSpec { .. }), "{err}");
    }

    #[test]
    fn test_bad_prefix_is_rejected() {
        for cidr in ["172.16.0.1/33", "172.16.0.1", "172.16.0.1/x"] {
            let doc = DOC.replace("172.16.0.1/24", cidr);
            let err = Cluster::from_yaml(&doc).unwrap_err();
            assert!(matches!(err, ParseError::Cidr { .. }), "{cidr}: {err}");
        }
    }

    #[test]
    fn test_unknown_network_reference_is_rejected() {
        let doc = DOC.replace("networks: \"net0 net1\"", "networks: \"net0 net9\"");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        match err {
            ParseError::UnknownNetwork { node, network } => {
                assert_eq!(node, "node1");
                assert_eq!(network, "net9");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reserved_admin_name_is_rejected() {
        let doc = DOC.replace("  node1:", "  fuel:");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::ReservedName(_)), "{err}");
    }

    #[test]
    fn test_bad_memory_size_is_rejected() {
        for memory in ["1X", "G", "\"12\"", "x1G"] {
            let doc = DOC.replace("memory: 1G", &format!("memory: {}", memory));
            let err = Cluster::from_yaml(&doc).unwrap_err();
            assert!(matches!(err, ParseError::MemorySize { .. }), "{memory}: {err}");
        }
    }

    #[test]
    fn test_bad_ssh_creds_are_rejected() {
        let doc = DOC.replace("root:r00tme@10.20.0.2", "root-10.20.0.2");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::SshCreds { .. }), "{err}");
    }

    #[test]
    fn test_missing_images_path_is_rejected() {
        let doc = DOC.replace("images_path: /var/lib/libvirt/images\n", "");
        let err = Cluster::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ParseError::MissingAttr("images_path")), "{err}");
    }

    #[test]
    fn test_residual_attrs_and_extra_params_survive() {
        let doc = format!("{}\nsite: lab1\n", DOC.replace("cpu: 1", "cpu: 1\n    rack: b2"));
        let cluster = Cluster::from_yaml(&doc).unwrap();
        assert_eq!(
            cluster.attrs.get("site").and_then(|v| v.as_str()),
            Some("lab1")
        );
        assert_eq!(
            cluster.workers["node1"].extra.get("rack").and_then(|v| v.as_str()),
            Some("b2")
        );
    }

    #[test]
    fn test_worker_can_disable_network_boot() {
        let doc = DOC.replace("cpu: 1", "cpu: 1\n    boot_network: false");
        let cluster = Cluster::from_yaml(&doc).unwrap();
        assert!(!cluster.workers["node1"].boot_network);
        // an alias reuses the parameter block verbatim
        assert!(!cluster.workers["node2"].boot_network);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        std::fs::write(&path, DOC).unwrap();

        let cluster = Cluster::load(&path).unwrap();
        assert_eq!(cluster.workers.len(), 2);

        let err = Cluster::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"), "{err}");
    }

    #[test]
    fn test_memory_parts_units() {
        assert_eq!(memory_parts("n", "512K").unwrap(), ("512", "KiB"));
        assert_eq!(memory_parts("n", "2048M").unwrap(), ("2048", "MiB"));
        assert_eq!(memory_parts("n", "2G").unwrap(), ("2", "GiB"));
        assert_eq!(memory_parts("n", "1T").unwrap(), ("1", "TiB"));
    }
}
