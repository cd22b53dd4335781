//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use snmp_subagent::prelude::*;

/// A request the scripted bridge feeds to the agent on its next poll.
#[derive(Debug, Clone)]
pub enum Request {
    Get(Vec<Oid>),
    Set(Vec<VarBind>),
}

#[derive(Debug, Clone)]
pub enum Response {
    Get(GetOutcome),
    Set(SetOutcome),
}

impl Response {
    pub fn into_set(self) -> SetOutcome {
        match self {
            Response::Set(outcome) => outcome,
            other => panic!("expected a set response, got {:?}", other),
        }
    }

    pub fn into_get(self) -> GetOutcome {
        match self {
            Response::Get(outcome) => outcome,
            other => panic!("expected a get response, got {:?}", other),
        }
    }
}

#[derive(Debug, Default)]
pub struct Script {
    pub requests: VecDeque<Request>,
    pub responses: Vec<Response>,
    pub attached: BTreeSet<Oid>,
    pub refuse_attach: Option<Oid>,
    pub init_delay: Duration,
    pub fail_init: bool,
    pub inits: usize,
    pub shutdowns: usize,
}

/// In-memory bridge driven by the test thread.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBridge {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedBridge {
    pub fn push(&self, request: Request) {
        self.script.lock().requests.push_back(request);
    }

    /// Wait until `count` responses were produced and take them.
    pub fn wait_responses(&self, count: usize) -> Vec<Response> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let mut script = self.script.lock();
                if script.responses.len() >= count {
                    return script.responses.drain(..).collect();
                }
            }
            assert!(Instant::now() < deadline, "bridge produced no response in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn attached(&self) -> BTreeSet<Oid> {
        self.script.lock().attached.clone()
    }
}

impl AgentBridge for ScriptedBridge {
    fn init(&mut self, _config: &AgentConfig) -> Result<()> {
        let (delay, fail) = {
            let mut script = self.script.lock();
            script.inits += 1;
            (script.init_delay, script.fail_init)
        };
        std::thread::sleep(delay);
        if fail {
            return Err(AgentError::GeneralError("master agent unreachable".into()));
        }
        Ok(())
    }

    fn attach(&mut self, identifier: &Oid) -> Result<()> {
        let mut script = self.script.lock();
        if script.refuse_attach.as_ref() == Some(identifier) {
            return Err(AgentError::GeneralError(format!("cannot serve {}", identifier)));
        }
        script.attached.insert(identifier.clone());
        Ok(())
    }

    fn detach(&mut self, identifier: &Oid) -> Result<()> {
        self.script.lock().attached.remove(identifier);
        Ok(())
    }

    fn poll(&mut self, handler: &mut RequestHandler<'_>) -> Result<()> {
        let mut script = self.script.lock();
        while let Some(request) = script.requests.pop_front() {
            let response = match request {
                Request::Get(ids) => Response::Get(handler.get(&ids)),
                Request::Set(varbinds) => Response::Set(handler.set(&varbinds)),
            };
            script.responses.push(response);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.script.lock().shutdowns += 1;
    }
}

pub fn fast_config() -> AgentConfig {
    AgentConfig {
        poll_interval_ms: 2,
        ready_poll_attempts: 2000,
        ready_poll_interval_ms: 1,
        ..AgentConfig::default()
    }
}

pub fn oid(text: &str) -> Oid {
    text.parse().expect("valid test OID")
}

pub fn int_binding(identifier: &str, value: i32) -> VarBind {
    VarBind::new(oid(identifier), WireValue::new(WireType::Integer, value.to_be_bytes()))
}

pub fn text_binding(identifier: &str, value: &str) -> VarBind {
    VarBind::new(oid(identifier), WireValue::octets(value))
}

/// Start an agent over a scripted bridge and wait for it to be ready.
pub fn started_agent(
    bridge: ScriptedBridge,
    listener: impl ChangeListener + 'static,
) -> Subagent {
    let agent = Subagent::builder()
        .with_config(fast_config())
        .with_bridge(bridge)
        .with_listener(listener)
        .build()
        .expect("agent builds");
    agent.start().expect("agent starts");
    agent.wait_ready().expect("agent becomes ready");
    agent
}
