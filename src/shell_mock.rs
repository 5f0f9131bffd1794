//! Test mock for `shell::run_host`.
//!
//! Provides a thread-local mock handler that intercepts host commands during
//! tests and records every invocation, so tests never touch virsh or
//! qemu-img.

use std::cell::RefCell;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

/// Mock response for a host command.
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn empty() -> Self {
        Self::ok("")
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn to_output(&self) -> Output {
        Output {
            // Unix exit code encoding: status = code << 8
            status: ExitStatus::from_raw(self.exit_code << 8),
            stdout: self.stdout.as_bytes().to_vec(),
            stderr: self.stderr.as_bytes().to_vec(),
        }
    }
}

type MockHandler = Box<dyn Fn(&str, &[&str]) -> MockResponse>;

thread_local! {
    static HANDLER: RefCell<Option<MockHandler>> = const { RefCell::new(None) };
}

/// Guard that clears the mock handler on drop.
pub struct MockGuard;

impl Drop for MockGuard {
    fn drop(&mut self) {
        HANDLER.with(|h| *h.borrow_mut() = None);
    }
}

/// Try to intercept a host command via the installed mock handler.
pub(crate) fn intercept(cmd: &str, args: &[&str]) -> Option<Output> {
    HANDLER.with(|h| h.borrow().as_ref().map(|f| f(cmd, args).to_output()))
}

/// Commands seen by the mock, rendered as `cmd arg arg ...`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Install a handler for the current thread. Returns a guard (clears on
/// drop) and the log of intercepted commands.
pub fn install<F>(handler: F) -> (MockGuard, CallLog)
where
    F: Fn(&str, &[&str]) -> MockResponse + 'static,
{
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();

    HANDLER.with(|h| {
        *h.borrow_mut() = Some(Box::new(move |cmd, args| {
            log_clone
                .lock()
                .unwrap()
                .push(format!("{} {}", cmd, args.join(" ")).trim().to_string());
            handler(cmd, args)
        }));
    });

    (MockGuard, log)
}

/// Install a handler that lets every command succeed silently.
pub fn succeed_all() -> (MockGuard, CallLog) {
    install(|_, _| MockResponse::empty())
}
