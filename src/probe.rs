//! Blocking readiness checks against the freshly launched admin node:
//! TCP reachability, SSH handshake, then polling the bootstrap log until the
//! installation reports completion.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result};
use ssh2::{ErrorCode, Session};
use tracing::debug;

use crate::cluster::Node;
use crate::config::{
    BOOTSTRAP_DONE_MARKER, BOOTSTRAP_LOG, CONNECT_TIMEOUT, LOG_POLL_INTERVAL, PROBE_INTERVAL,
    SSH_PORT,
};
use crate::retry::RetryPolicy;
use crate::ui;

const SFTP_NO_SUCH_FILE: i32 = 2;

/// Bounds for the otherwise indefinite probe loops: Ctrl-C flag and an
/// optional per-stage deadline.
pub struct ProbeOpts {
    pub cancel: Arc<AtomicBool>,
    pub deadline: Option<Duration>,
}

impl Default for ProbeOpts {
    fn default() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }
}

impl ProbeOpts {
    fn policy(&self, interval: Duration) -> RetryPolicy {
        RetryPolicy {
            interval,
            deadline: self.deadline,
            cancel: Some(self.cancel.clone()),
        }
    }
}

/// Block until the admin node is reachable, answers SSH with the declared
/// credentials, and its bootstrap log reports a finished installation.
pub fn wait_admin_ready(node: &Node, opts: &ProbeOpts) -> Result<()> {
    let creds = node
        .ssh_creds
        .as_ref()
        .with_context(|| format!("node '{}' has no ssh_creds to probe readiness with", node.name))?;

    ui::action("Wait until the admin node appears online", || {
        wait_port(&creds.host, SSH_PORT, opts)
    })?;

    let session = ui::action("Wait for an ssh connection", || {
        wait_handshake(&creds.host, SSH_PORT, opts)
    })?;

    session
        .userauth_password(&creds.user, &creds.password)
        .with_context(|| format!("ssh authentication failed for {}@{}", creds.user, creds.host))?;

    ui::action("Wait until the installation finishes", || {
        wait_bootstrap_log(&session, opts)
    })
}

/// Loop short-timeout TCP connects until one succeeds. Every failure,
/// including name resolution, counts as "not up yet".
fn wait_port(host: &str, port: u16, opts: &ProbeOpts) -> Result<()> {
    opts.policy(PROBE_INTERVAL).wait_for("tcp probe", || {
        let Ok(mut addrs) = (host, port).to_socket_addrs() else {
            return Ok(None);
        };
        let Some(addr) = addrs.next() else {
            return Ok(None);
        };
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(_) => Ok(Some(())),
            Err(err) => {
                debug!(host, port, error = %err, "tcp connect failed");
                Ok(None)
            }
        }
    })
}

/// Establish an SSH session. The host answering TCP but not yet routing
/// (interfaces still coming up) is retried; anything else is fatal.
fn wait_handshake(host: &str, port: u16, opts: &ProbeOpts) -> Result<Session> {
    opts.policy(PROBE_INTERVAL).wait_for("ssh handshake", || {
        use std::io::ErrorKind;

        let stream = match TcpStream::connect((host, port)) {
            Ok(stream) => stream,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable
                ) =>
            {
                debug!(host, error = %err, "no route to host yet");
                return Ok(None);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("connecting to {}:{}", host, port));
            }
        };

        let mut session = Session::new().context("creating ssh session")?;
        session.set_tcp_stream(stream);
        session
            .handshake()
            .with_context(|| format!("ssh handshake with {}", host))?;
        Ok(Some(session))
    })
}

/// Read the bootstrap log over SFTP until the completion marker shows up.
/// The log not existing yet means the installer has not started writing it.
fn wait_bootstrap_log(session: &Session, opts: &ProbeOpts) -> Result<()> {
    let sftp = session.sftp().context("opening sftp channel")?;

    opts.policy(LOG_POLL_INTERVAL)
        .wait_for("bootstrap log poll", || {
            let mut file = match sftp.open(Path::new(BOOTSTRAP_LOG)) {
                Ok(file) => file,
                Err(err) if err.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => return Ok(None),
                Err(err) => {
                    return Err(err).with_context(|| format!("opening {}", BOOTSTRAP_LOG));
                }
            };

            let mut contents = String::new();
            file.read_to_string(&mut contents)
                .with_context(|| format!("reading {}", BOOTSTRAP_LOG))?;
            Ok(contents.contains(BOOTSTRAP_DONE_MARKER).then_some(()))
        })
}
