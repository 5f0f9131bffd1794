use std::path::Path;

use anyhow::{Result, bail};

use crate::shell;
use crate::ui;

/// Ensure a qcow2 backing image exists at `path` with capacity `size`.
///
/// Strictly create-if-absent: an existing file is left untouched whatever
/// its size, so re-runs never clobber images of already-provisioned VMs.
pub fn ensure_image(path: &Path, size: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    let path_arg = path.display().to_string();
    ui::action(
        &format!("Create disk image {} size {}", path_arg, size),
        || {
            let output = shell::run_host("qemu-img", &["create", "-f", "qcow2", &path_arg, size])?;
            if !output.status.success() {
                bail!("qemu-img create failed: {}", shell::stderr_text(&output));
            }
            Ok(())
        },
    )
}
