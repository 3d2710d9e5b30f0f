//! Mock hardware adapter for testing
//!
//! This adapter provides a simulated SCPI instrument for exercising the
//! sequencer without physical hardware. It provides:
//! - Scripted replies per command, with sensible defaults
//! - Controllable failure injection on the n-th matching command
//! - Trigger hooks (e.g. request cancellation while a step is in flight)
//! - Call logging for test verification
//!
//! [`MockBench`] pairs a mock supply and a mock meter that share a simulated
//! output node, so a `READ?` on the meter returns the last `VOLT` set on the
//! supply.

use super::{ScpiTransport, TransportOpener};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Hook = Box<dyn Fn() + Send + Sync>;

struct FailureRule {
    pattern: String,
    remaining: usize,
}

struct HookRule {
    pattern: String,
    remaining: usize,
    action: Hook,
}

#[derive(Default)]
struct MockState {
    open: bool,
    latency: Duration,
    call_log: Vec<String>,
    scripted: HashMap<String, VecDeque<String>>,
    fixed: HashMap<String, String>,
    failures: Vec<FailureRule>,
    hooks: Vec<HookRule>,
    fail_next: bool,
    fail_close: bool,
}

/// Mock SCPI instrument
///
/// # Example
///
/// ```
/// use sweep_daq::hardware::MockAdapter;
///
/// let dmm = MockAdapter::new("USB0::MOCK::DMM::INSTR");
/// dmm.push_reply("READ?", "garbage");
/// dmm.fail_on("READ?", 3);
/// assert!(dmm.call_log().is_empty());
/// ```
#[derive(Clone)]
pub struct MockAdapter {
    resource_name: String,
    state: Arc<Mutex<MockState>>,
    node: Arc<Mutex<f64>>,
}

impl MockAdapter {
    /// Create a new, unopened mock instrument
    pub fn new(resource_name: &str) -> Self {
        Self::with_node(resource_name, Arc::new(Mutex::new(0.0)))
    }

    fn with_node(resource_name: &str, node: Arc<Mutex<f64>>) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
            node,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set simulated latency for every operation
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Queue a one-shot reply for `cmd`; queued replies are used before the fixed one.
    pub fn push_reply(&self, cmd: &str, reply: &str) {
        self.state()
            .scripted
            .entry(cmd.to_string())
            .or_default()
            .push_back(reply.to_string());
    }

    /// Always answer `cmd` with `reply` once any queued replies are used up.
    pub fn set_reply(&self, cmd: &str, reply: &str) {
        self.state().fixed.insert(cmd.to_string(), reply.to_string());
    }

    /// Fail the `occurrence`-th (1-based) command starting with `pattern`.
    pub fn fail_on(&self, pattern: &str, occurrence: usize) {
        self.state().failures.push(FailureRule {
            pattern: pattern.to_string(),
            remaining: occurrence.max(1),
        });
    }

    /// Inject a failure for the next operation
    pub fn inject_next_failure(&self) {
        self.state().fail_next = true;
    }

    /// Make `close()` report an error (the handle is still released).
    pub fn fail_close(&self) {
        self.state().fail_close = true;
    }

    /// Run `action` when the `occurrence`-th command starting with `pattern` arrives.
    pub fn on_command<F>(&self, pattern: &str, occurrence: usize, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.state().hooks.push(HookRule {
            pattern: pattern.to_string(),
            remaining: occurrence.max(1),
            action: Box::new(action),
        });
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    /// Get the call log
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    /// Commands sent with `write` (queries and lifecycle calls excluded)
    pub fn writes(&self) -> Vec<String> {
        self.call_log()
            .into_iter()
            .filter_map(|c| c.strip_prefix("write: ").map(str::to_string))
            .collect()
    }

    /// Number of logged calls equal to `entry` (e.g. `"write: OUTP OFF"`)
    pub fn count(&self, entry: &str) -> usize {
        self.state().call_log.iter().filter(|c| *c == entry).count()
    }

    fn mark_open(&self) {
        let mut state = self.state();
        state.open = true;
        state.call_log.push("open".to_string());
    }

    /// Records the call, fires hooks and decides whether it fails.
    async fn dispatch(&self, kind: &str, cmd: &str) -> Result<()> {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let fired: Vec<HookRule> = {
            let mut state = self.state();
            state.call_log.push(format!("{}: {}", kind, cmd));

            if !state.open {
                bail!("Mock instrument '{}' is not open", self.resource_name);
            }

            for hook in state.hooks.iter_mut() {
                if cmd.starts_with(&hook.pattern) {
                    hook.remaining -= 1;
                }
            }
            let (fired, pending) = std::mem::take(&mut state.hooks)
                .into_iter()
                .partition(|h| h.remaining == 0);
            state.hooks = pending;
            fired
        };
        // Run outside the lock so a hook may inspect this mock.
        for hook in fired {
            (hook.action)();
        }

        let mut state = self.state();
        if std::mem::take(&mut state.fail_next) {
            bail!("Injected failure on '{}'", cmd);
        }
        let mut failed = false;
        for rule in state.failures.iter_mut() {
            if rule.remaining > 0 && cmd.starts_with(&rule.pattern) {
                rule.remaining -= 1;
                failed |= rule.remaining == 0;
            }
        }
        if failed {
            bail!("Injected failure on '{}'", cmd);
        }
        Ok(())
    }

    fn apply_write(&self, cmd: &str) {
        if let Some(value) = cmd
            .strip_prefix("VOLT ")
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            *self.node.lock().unwrap_or_else(|e| e.into_inner()) = value;
        }
    }

    fn reply_for(&self, cmd: &str) -> String {
        let mut state = self.state();
        if let Some(reply) = state.scripted.get_mut(cmd).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = state.fixed.get(cmd) {
            return reply.clone();
        }
        drop(state);

        match cmd {
            "*IDN?" => format!("MOCK,{},0,1.0", self.resource_name),
            "READ?" | "MEAS:VOLT:DC?" => {
                let volts = *self.node.lock().unwrap_or_else(|e| e.into_inner());
                format!("{:+.8E}", volts)
            }
            _ => format!("MOCK_RESPONSE:{}", cmd),
        }
    }
}

#[async_trait]
impl ScpiTransport for MockAdapter {
    async fn write(&mut self, cmd: &str) -> Result<()> {
        self.dispatch("write", cmd).await?;
        self.apply_write(cmd);
        Ok(())
    }

    async fn query(&mut self, cmd: &str) -> Result<String> {
        self.dispatch("query", cmd).await?;
        Ok(self.reply_for(cmd))
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.call_log.push("close".to_string());
        let was_open = std::mem::replace(&mut state.open, false);
        if was_open && state.fail_close {
            bail!("Injected close failure on '{}'", self.resource_name);
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_name
    }
}

/// Mock supply + meter wired to the same simulated node.
#[derive(Clone)]
pub struct MockBench {
    pub psu: MockAdapter,
    pub dmm: MockAdapter,
    unreachable: Arc<Mutex<HashSet<String>>>,
}

impl Default for MockBench {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBench {
    pub const PSU_RESOURCE: &'static str = "TCPIP0::mock-psu::5025::SOCKET";
    pub const DMM_RESOURCE: &'static str = "USB0::MOCK::DMM::INSTR";

    pub fn new() -> Self {
        let node = Arc::new(Mutex::new(0.0));
        Self {
            psu: MockAdapter::with_node(Self::PSU_RESOURCE, node.clone()),
            dmm: MockAdapter::with_node(Self::DMM_RESOURCE, node),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make opening `resource` fail as if nothing answered at that address.
    pub fn set_unreachable(&self, resource: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(resource.to_string());
    }
}

#[async_trait]
impl TransportOpener for MockBench {
    async fn open(&self, resource: &str, _timeout: Duration) -> Result<Box<dyn ScpiTransport>> {
        if self
            .unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(resource)
        {
            bail!("No instrument answered at '{}'", resource);
        }

        let adapter = if resource == self.psu.resource_name {
            self.psu.clone()
        } else if resource == self.dmm.resource_name {
            self.dmm.clone()
        } else {
            bail!("Unknown mock resource '{}'", resource);
        };
        adapter.mark_open();
        Ok(Box::new(adapter))
    }
}
