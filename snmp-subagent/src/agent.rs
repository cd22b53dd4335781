//! The subagent service.
//!
//! A [`Subagent`] owns one worker thread. The worker owns the registry and
//! the bridge; every call made through the handle is sent to the worker over
//! a channel and answered on a per-call reply channel, so the registry is
//! only ever touched from a single thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::Builder;
use crate::bridge::{AgentBridge, GetOutcome, NullBridge, RequestHandler};
use crate::config::{AgentConfig, AgentConfigBuilder};
use crate::descriptor::ValueDescriptor;
use crate::error::{AgentError, Result};
use crate::event::{ChangeListener, IgnoreChanges};
use crate::oid::Oid;
use crate::registry::ParameterRegistry;
use crate::transaction::{SetOutcome, VarBind};
use crate::value::{Candidate, Value};

const WORKER_THREAD_NAME: &str = "snmp_subagent";

enum Command {
    Register {
        descriptor: ValueDescriptor,
        initial: Candidate,
        reply: Sender<Result<()>>,
    },
    Unregister {
        identifier: String,
        reply: Sender<Result<()>>,
    },
    Read {
        identifier: String,
        reply: Sender<Result<Value>>,
    },
    Write {
        identifier: String,
        candidate: Candidate,
        reply: Sender<Result<()>>,
    },
    Set {
        varbinds: Vec<VarBind>,
        reply: Sender<SetOutcome>,
    },
    Get {
        identifiers: Vec<Oid>,
        reply: Sender<GetOutcome>,
    },
    Identifiers {
        reply: Sender<Vec<Oid>>,
    },
    Shutdown,
}

/// Everything the worker owns. Handed back on stop so a restart keeps the
/// registered parameters.
struct WorkerState {
    bridge: Box<dyn AgentBridge>,
    registry: ParameterRegistry,
}

impl WorkerState {
    fn start_up(&mut self, config: &AgentConfig) -> Result<()> {
        self.bridge.init(config)?;
        // Parameters kept from a previous run are served again.
        for oid in self.registry.identifiers() {
            if let Err(e) = self.bridge.attach(oid) {
                warn!("[AGENT] Bridge refused to re-attach OID {}: {}", oid, e);
            }
        }
        self.registry.mark_ready();
        Ok(())
    }

    fn register(&mut self, descriptor: ValueDescriptor, initial: Candidate) -> Result<()> {
        let (oid, value) = self.registry.check_registration(&descriptor, &initial)?;
        self.bridge.attach(&oid).inspect_err(|e| {
            warn!("[AGENT] Bridge refused to attach OID {}: {}", oid, e);
        })?;
        // Nothing else touches the registry between the check and the insert.
        self.registry.insert_checked(oid, descriptor, value);
        Ok(())
    }

    fn unregister(&mut self, identifier: &str) -> Result<()> {
        let oid: Oid = identifier.parse().inspect_err(|e| {
            warn!("[AGENT] Could not parse OID {}: {}", identifier, e);
        })?;
        self.registry.unregister_oid(&oid)?;
        if let Err(e) = self.bridge.detach(&oid) {
            warn!("[AGENT] Bridge failed to detach OID {}: {}", oid, e);
        }
        Ok(())
    }

    fn handle(&mut self, command: Command, config: &AgentConfig, listener: &dyn ChangeListener) {
        // A dropped reply receiver only means the caller went away.
        match command {
            Command::Register {
                descriptor,
                initial,
                reply,
            } => {
                let _ = reply.send(self.register(descriptor, initial));
            }
            Command::Unregister { identifier, reply } => {
                let _ = reply.send(self.unregister(&identifier));
            }
            Command::Read { identifier, reply } => {
                let _ = reply.send(self.registry.read(&identifier));
            }
            Command::Write {
                identifier,
                candidate,
                reply,
            } => {
                let _ = reply.send(self.registry.write(&identifier, candidate));
            }
            Command::Set { varbinds, reply } => {
                let mut handler = RequestHandler::new(&self.registry, config.codec(), listener);
                let _ = reply.send(handler.set(&varbinds));
            }
            Command::Get { identifiers, reply } => {
                let mut handler = RequestHandler::new(&self.registry, config.codec(), listener);
                let _ = reply.send(handler.get(&identifiers));
            }
            Command::Identifiers { reply } => {
                let _ = reply.send(self.registry.identifiers().cloned().collect());
            }
            Command::Shutdown => {}
        }
    }

    fn poll(&mut self, config: &AgentConfig, listener: &dyn ChangeListener) {
        let mut handler = RequestHandler::new(&self.registry, config.codec(), listener);
        if let Err(e) = self.bridge.poll(&mut handler) {
            warn!("[AGENT] Bridge poll failed: {}", e);
        }
    }
}

fn run_worker(
    mut state: WorkerState,
    config: AgentConfig,
    listener: Arc<dyn ChangeListener>,
    commands: Receiver<Command>,
    ready: Arc<AtomicBool>,
    startup_error: Arc<Mutex<Option<AgentError>>>,
) -> WorkerState {
    if let Err(e) = state.start_up(&config) {
        error!("[AGENT] {} failed to start: {}", config.agent_name, e);
        *startup_error.lock() = Some(AgentError::GeneralError(format!("start-up failed: {}", e)));
        return state;
    }
    ready.store(true, Ordering::Release);
    info!("[AGENT] {} is ready", config.agent_name);

    let interval = config.poll_interval();
    let mut last_poll = Instant::now();
    loop {
        match commands.recv_timeout(interval) {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(command) => state.handle(command, &config, listener.as_ref()),
            Err(RecvTimeoutError::Timeout) => {}
        }
        // Keep polling the bridge under a steady stream of commands.
        if last_poll.elapsed() >= interval {
            state.poll(&config, listener.as_ref());
            last_poll = Instant::now();
        }
    }

    ready.store(false, Ordering::Release);
    state.registry.clear_ready();
    state.bridge.shutdown();
    info!("[AGENT] {} stopped", config.agent_name);
    state
}

/// Handle to a subagent and its worker thread.
pub struct Subagent {
    config: AgentConfig,
    listener: Arc<dyn ChangeListener>,
    idle: Mutex<Option<WorkerState>>,
    commands: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<WorkerState>>>,
    ready: Arc<AtomicBool>,
    /// Set by the worker when bridge initialization fails.
    startup_error: Arc<Mutex<Option<AgentError>>>,
}

impl Subagent {
    pub fn builder() -> SubagentBuilder {
        SubagentBuilder::default()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Spawn the worker. Start-up completes asynchronously; see
    /// [`Subagent::wait_ready`].
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            debug!("[AGENT] {} is already running", self.config.agent_name);
            return Ok(());
        }
        let Some(state) = self.idle.lock().take() else {
            return Err(AgentError::GeneralError("worker state is missing".into()));
        };

        let (tx, rx) = flume::unbounded();
        let config = self.config.clone();
        let listener = self.listener.clone();
        let ready = self.ready.clone();
        ready.store(false, Ordering::Release);
        let startup_error = self.startup_error.clone();
        *startup_error.lock() = None;

        // The state moves into the closure; if spawning fails it is lost and
        // the agent can no longer be started.
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(state, config, listener, rx, ready, startup_error))
            .map_err(|e| AgentError::GeneralError(format!("failed to spawn worker: {}", e)))?;

        *self.commands.lock() = Some(tx);
        *worker = Some(handle);
        info!("[AGENT] {} started", self.config.agent_name);
        Ok(())
    }

    /// Stop the worker and wait for it to exit. Registered parameters are
    /// kept for the next `start`.
    pub fn stop(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };
        if let Some(tx) = self.commands.lock().take() {
            let _ = tx.send(Command::Shutdown);
        }
        let state = handle
            .join()
            .map_err(|_| AgentError::GeneralError("worker thread panicked".into()))?;
        self.ready.store(false, Ordering::Release);
        *self.idle.lock() = Some(state);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The reason start-up failed, if it did.
    pub fn startup_error(&self) -> Option<AgentError> {
        self.startup_error.lock().clone()
    }

    /// `Ok` once ready, the start-up failure if any, `NotReady` otherwise.
    fn readiness(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        match self.startup_error() {
            Some(e) => Err(e),
            None => Err(AgentError::NotReady),
        }
    }

    /// Poll the ready flag a bounded number of times.
    ///
    /// Returns the start-up error as soon as bridge initialization fails.
    pub fn wait_ready(&self) -> Result<()> {
        if !self.is_running() {
            return Err(AgentError::NotRunning);
        }
        for _ in 0..self.config.ready_poll_attempts {
            match self.readiness() {
                Err(AgentError::NotReady) => {}
                other => return other,
            }
            std::thread::sleep(self.config.ready_poll_interval());
        }
        match self.readiness() {
            Err(AgentError::NotReady) => {}
            other => return other,
        }
        warn!(
            "[AGENT] {} not ready after {} attempts",
            self.config.agent_name, self.config.ready_poll_attempts
        );
        Err(AgentError::NotReady)
    }

    fn call<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let Some(tx) = self.commands.lock().clone() else {
            return Err(AgentError::NotRunning);
        };
        let (reply_tx, reply_rx) = flume::bounded(1);
        tx.send(command(reply_tx))
            .map_err(|_| AgentError::NotRunning)?;
        reply_rx.recv().map_err(|_| AgentError::NotRunning)
    }

    /// Register a parameter with its initial value.
    pub fn register(
        &self,
        descriptor: ValueDescriptor,
        initial: impl Into<Candidate>,
    ) -> Result<()> {
        let initial = initial.into();
        self.call(|reply| Command::Register {
            descriptor,
            initial,
            reply,
        })?
    }

    pub fn unregister(&self, identifier: &str) -> Result<()> {
        let identifier = identifier.to_string();
        self.call(|reply| Command::Unregister { identifier, reply })?
    }

    /// Current value of a parameter; `NotReady` until start-up completed,
    /// or the start-up error if it failed.
    pub fn read(&self, identifier: &str) -> Result<Value> {
        if self.is_running() {
            self.readiness()?;
        }
        let identifier = identifier.to_string();
        self.call(|reply| Command::Read { identifier, reply })?
    }

    pub fn write(&self, identifier: &str, candidate: impl Into<Candidate>) -> Result<()> {
        let identifier = identifier.to_string();
        let candidate = candidate.into();
        self.call(|reply| Command::Write {
            identifier,
            candidate,
            reply,
        })?
    }

    /// Run a set request as if it arrived through the bridge.
    pub fn set(&self, varbinds: Vec<VarBind>) -> Result<SetOutcome> {
        self.call(|reply| Command::Set { varbinds, reply })
    }

    /// Run a get request as if it arrived through the bridge.
    pub fn get(&self, identifiers: Vec<Oid>) -> Result<GetOutcome> {
        self.call(|reply| Command::Get { identifiers, reply })
    }

    pub fn identifiers(&self) -> Result<Vec<Oid>> {
        self.call(|reply| Command::Identifiers { reply })
    }
}

impl Drop for Subagent {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("[AGENT] {} did not stop cleanly: {}", self.config.agent_name, e);
        }
    }
}

/// Builder for [`Subagent`].
pub struct SubagentBuilder {
    config: Option<AgentConfig>,
    bridge: Box<dyn AgentBridge>,
    listener: Arc<dyn ChangeListener>,
}

impl Default for SubagentBuilder {
    fn default() -> Self {
        Self {
            config: None,
            bridge: Box::new(NullBridge),
            listener: Arc::new(IgnoreChanges),
        }
    }
}

impl SubagentBuilder {
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_bridge<B: AgentBridge>(mut self, bridge: B) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    /// Receiver of change notices for every accepted write.
    pub fn with_listener<L: ChangeListener + 'static>(mut self, listener: L) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    pub fn with_shared_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = listener;
        self
    }
}

impl Builder for SubagentBuilder {
    type Output = Subagent;

    fn build(self) -> Result<Subagent> {
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => AgentConfigBuilder::default().build()?,
        };
        debug!("[AGENT] Building {} for {}", config.agent_name, config.master_address);
        Ok(Subagent {
            config,
            listener: self.listener,
            idle: Mutex::new(Some(WorkerState {
                bridge: self.bridge,
                registry: ParameterRegistry::new(),
            })),
            commands: Mutex::new(None),
            worker: Mutex::new(None),
            ready: Arc::new(AtomicBool::new(false)),
            startup_error: Arc::new(Mutex::new(None)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn agent() -> Subagent {
        Subagent::builder()
            .with_config(AgentConfig {
                poll_interval_ms: 5,
                ..AgentConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_calls_before_start() {
        let agent = agent();
        assert!(!agent.is_running());
        assert_eq!(agent.read(".1.3"), Err(AgentError::NotRunning));
        assert_eq!(agent.wait_ready(), Err(AgentError::NotRunning));
        assert_eq!(
            agent.register(ValueDescriptor::new(".1.3", ValueKind::Gauge), 1u32),
            Err(AgentError::NotRunning)
        );
    }

    #[test]
    fn test_lifecycle() {
        let agent = agent();
        agent.start().unwrap();
        agent.wait_ready().unwrap();

        agent
            .register(ValueDescriptor::new(".1.3.6.1.4.1.7", ValueKind::Counter), 3u32)
            .unwrap();
        assert_eq!(agent.read(".1.3.6.1.4.1.7"), Ok(Value::Counter(3)));
        agent.write(".1.3.6.1.4.1.7", 4u32).unwrap();
        assert_eq!(agent.read(".1.3.6.1.4.1.7"), Ok(Value::Counter(4)));

        agent.stop().unwrap();
        assert!(!agent.is_ready());
        assert_eq!(agent.read(".1.3.6.1.4.1.7"), Err(AgentError::NotRunning));

        // Parameters survive a restart.
        agent.start().unwrap();
        agent.wait_ready().unwrap();
        assert_eq!(agent.read(".1.3.6.1.4.1.7"), Ok(Value::Counter(4)));
    }

    #[test]
    fn test_start_twice() {
        let agent = agent();
        agent.start().unwrap();
        agent.start().unwrap();
        agent.wait_ready().unwrap();
        assert!(agent.is_running());
    }

    /// Attaches everything except one identifier.
    struct PickyBridge {
        refused: Oid,
    }

    impl AgentBridge for PickyBridge {
        fn init(&mut self, _config: &AgentConfig) -> Result<()> {
            Ok(())
        }

        fn attach(&mut self, identifier: &Oid) -> Result<()> {
            if *identifier == self.refused {
                return Err(AgentError::GeneralError("refused".into()));
            }
            Ok(())
        }

        fn poll(&mut self, _handler: &mut RequestHandler<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_worker_register_stores_checked_value() {
        let refused: Oid = ".1.3.6.1.4.1.9".parse().unwrap();
        let mut state = WorkerState {
            bridge: Box::new(PickyBridge {
                refused: refused.clone(),
            }),
            registry: ParameterRegistry::new(),
        };

        let stored: Oid = ".1.3.6.1.4.1.8".parse().unwrap();
        state
            .register(
                ValueDescriptor::new(".1.3.6.1.4.1.8", ValueKind::Integer),
                Candidate::from(12i32),
            )
            .unwrap();
        let parameter = state.registry.get(&stored).unwrap();
        assert_eq!(parameter.value(), &Value::Integer(12));

        let refusal = state.register(
            ValueDescriptor::new(".1.3.6.1.4.1.9", ValueKind::Integer),
            Candidate::from(1i32),
        );
        assert!(matches!(refusal, Err(AgentError::GeneralError(_))));
        assert!(!state.registry.contains(&refused));

        let duplicate = state.register(
            ValueDescriptor::new(".1.3.6.1.4.1.8", ValueKind::Integer),
            Candidate::from(3i32),
        );
        assert!(matches!(duplicate, Err(AgentError::AlreadyRegistered(_))));
        assert_eq!(state.registry.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Subagent::builder()
            .with_config(AgentConfig {
                max_octets: 0,
                ..AgentConfig::default()
            })
            .build();
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
