use anyhow::{Context, Result};
use std::process::{Command, Output};

/// Run a command on the host, capturing output.
pub fn run_host(cmd: &str, args: &[&str]) -> Result<Output> {
    #[cfg(test)]
    if let Some(output) = crate::shell_mock::intercept(cmd, args) {
        return Ok(output);
    }

    Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))
}

/// Trimmed stderr of a finished command, for error reporting.
pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell_mock::{self, MockResponse};

    #[test]
    fn test_run_host_intercepted() {
        let (_guard, log) = shell_mock::install(|_, _| MockResponse::ok("hello"));
        let output = run_host("some-tool", &["--flag", "value"]).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
        assert_eq!(log.lock().unwrap().as_slice(), ["some-tool --flag value"]);
    }

    #[test]
    fn test_stderr_text_trims() {
        let (_guard, _log) = shell_mock::install(|_, _| MockResponse::fail(1, "boom\n"));
        let output = run_host("some-tool", &[]).unwrap();
        assert!(!output.status.success());
        assert_eq!(stderr_text(&output), "boom");
    }
}
