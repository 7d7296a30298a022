//! Isolated script execution.
//!
//! Scripts run in an embedded interpreter that only sees the language
//! intrinsics plus the host functions explicitly bound by the caller. There is
//! no process, filesystem or network global to reach, whatever path the script
//! takes through the constructor chain.

mod marshal;
mod worker;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::domain::{HostValue, ProxyError, Result, SandboxBindings};
use worker::{Command, Startup};

/// Names a host binding may never replace.
const RESERVED_GLOBALS: &[&str] = &[
    "Function",
    "Object",
    "eval",
    "globalThis",
    "Array",
    "Promise",
    "Reflect",
    "Proxy",
    "Symbol",
    "Error",
    "JSON",
    "constructor",
    "__proto__",
    "prototype",
];

#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Virtual filename used in stack traces.
    pub source_label: String,
    pub host_call_timeout: Duration,
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            source_label: "proxy.pac".to_string(),
            host_call_timeout: Duration::from_secs(5),
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
        }
    }
}

/// Host handle to a function defined inside a sandbox.
///
/// Cheap to share; the sandbox thread shuts down once the last handle is
/// dropped and outstanding calls have settled.
pub struct SandboxFunction {
    commands: mpsc::UnboundedSender<Command>,
    source: Arc<str>,
    entry: String,
}

impl SandboxFunction {
    /// Invokes the entry function and waits for its (possibly async) result.
    pub async fn call(&self, args: Vec<HostValue>) -> Result<HostValue> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Call { args, reply })
            .map_err(|_| ProxyError::Sandbox(format!("Sandbox for `{}` has shut down", self.entry)))?;

        response
            .await
            .map_err(|_| ProxyError::Sandbox(format!("Sandbox for `{}` dropped the call", self.entry)))?
    }

    /// Source text the function was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Evaluates `source` in a fresh interpreter with `bindings` as globals and
/// returns a handle to the function named `entry`.
pub async fn compile(
    source: &str,
    entry: &str,
    bindings: SandboxBindings,
    options: SandboxOptions,
) -> Result<SandboxFunction> {
    if !is_identifier(entry) {
        return Err(ProxyError::InvalidInput(format!("`{}` is not a valid function name", entry)));
    }
    for name in bindings.keys() {
        if RESERVED_GLOBALS.contains(&name.as_str()) {
            return Err(ProxyError::SandboxEscape(format!(
                "Host function `{}` would replace a built-in global",
                name
            )));
        }
        if !is_identifier(name) {
            return Err(ProxyError::InvalidInput(format!("`{}` is not a valid host function name", name)));
        }
    }

    let (commands, receiver) = mpsc::unbounded_channel();
    let (ready, started) = oneshot::channel();
    let startup = Startup {
        source: source.to_string(),
        entry: entry.to_string(),
        bindings,
        options,
    };

    std::thread::Builder::new()
        .name(format!("sandbox-{}", entry))
        .spawn(move || worker::run(startup, ready, receiver))
        .map_err(|e| ProxyError::Sandbox(format!("Failed to spawn sandbox thread: {}", e)))?;

    started
        .await
        .map_err(|_| ProxyError::Sandbox("Sandbox thread exited during startup".to_string()))??;

    Ok(SandboxFunction {
        commands,
        source: Arc::from(source),
        entry: entry.to_string(),
    })
}
