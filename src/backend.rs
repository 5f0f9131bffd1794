//! Virtualization backend seam. The real implementation shells out to
//! virsh; tests substitute an in-memory double.

use std::io::Write;
use std::process::Output;

use anyhow::{Context, Result, bail};

use crate::shell;

/// Result of an existence check against the backend. "Not found" is the only
/// recoverable lookup outcome; real errors surface as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found,
    NotFound,
}

pub trait Backend {
    fn lookup_network(&self, name: &str) -> Result<Lookup>;
    fn lookup_vm(&self, name: &str) -> Result<Lookup>;
    fn create_network(&self, xml: &str) -> Result<()>;
    fn create_vm(&self, xml: &str) -> Result<()>;
}

/// Libvirt via the virsh client tool.
#[derive(Debug)]
pub struct VirshBackend {
    url: String,
}

impl VirshBackend {
    /// Verify the connection URL answers before doing any real work.
    pub fn connect(url: &str) -> Result<Self> {
        let output = shell::run_host("virsh", &["-c", url, "hostname"])?;
        if !output.status.success() {
            bail!(
                "cannot connect to libvirt at {}: {}",
                url,
                shell::stderr_text(&output)
            );
        }
        Ok(Self {
            url: url.to_string(),
        })
    }

    fn virsh(&self, args: &[&str]) -> Result<Output> {
        let mut full = vec!["-c", self.url.as_str()];
        full.extend_from_slice(args);
        shell::run_host("virsh", &full)
    }

    fn lookup(&self, subcmd: &str, kind: &str, name: &str) -> Result<Lookup> {
        let output = self.virsh(&[subcmd, name])?;
        if output.status.success() {
            return Ok(Lookup::Found);
        }
        let stderr = shell::stderr_text(&output);
        if is_not_found(&stderr) {
            Ok(Lookup::NotFound)
        } else {
            bail!("looking up {} '{}': {}", kind, name, stderr);
        }
    }

    /// Submit a definition; virsh takes XML as a file, so stage it in a
    /// temp file for the duration of the call.
    fn create(&self, subcmd: &str, kind: &str, xml: &str) -> Result<()> {
        let mut staged = tempfile::Builder::new()
            .prefix("fuelkvm-")
            .suffix(".xml")
            .tempfile()
            .context("staging definition file")?;
        staged
            .write_all(xml.as_bytes())
            .context("writing definition file")?;

        let path = staged.path().display().to_string();
        let output = self.virsh(&[subcmd, &path])?;
        if !output.status.success() {
            bail!("creating {}: {}", kind, shell::stderr_text(&output));
        }
        Ok(())
    }
}

impl Backend for VirshBackend {
    fn lookup_network(&self, name: &str) -> Result<Lookup> {
        self.lookup("net-info", "network", name)
    }

    fn lookup_vm(&self, name: &str) -> Result<Lookup> {
        self.lookup("dominfo", "VM", name)
    }

    fn create_network(&self, xml: &str) -> Result<()> {
        self.create("net-create", "network", xml)
    }

    fn create_vm(&self, xml: &str) -> Result<()> {
        self.create("create", "VM", xml)
    }
}

/// Classify virsh stderr for a failed lookup: missing object vs. real error.
fn is_not_found(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("not found") || s.contains("failed to get domain") || s.contains("failed to get network")
}
