mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use parking_lot::Mutex;
use snmp_subagent::event::ListenerError;
use snmp_subagent::prelude::*;

const LEVEL: &str = ".1.3.6.1.4.1.8072.9999.1";
const MODE: &str = ".1.3.6.1.4.1.8072.9999.2";
const LABEL: &str = ".1.3.6.1";

fn register_defaults(agent: &Subagent) {
    agent
        .register(
            ValueDescriptor::new(LEVEL, ValueKind::Integer)
                .with_limits(0, 100)
                .with_step(5),
            20,
        )
        .unwrap();
    agent
        .register(
            ValueDescriptor::new(MODE, ValueKind::Enumerated).with_permitted_values([3, 1, 2]),
            1,
        )
        .unwrap();
    agent
        .register(
            ValueDescriptor::new(LABEL, ValueKind::Text).read_only(true),
            "lab",
        )
        .unwrap();
}

#[test]
fn test_accepted_write_flows_back_through_listener() {
    let (tx, rx) = flume::unbounded::<ChangeNotice>();
    let bridge = ScriptedBridge::default();
    let agent = started_agent(bridge.clone(), tx);
    register_defaults(&agent);

    bridge.push(Request::Set(vec![int_binding(LEVEL, 45)]));
    let outcome = bridge.wait_responses(1).remove(0).into_set();
    assert!(outcome.is_success());
    assert_eq!(outcome.error_index, 0);

    // Nothing is stored until the subscriber writes the value back.
    assert_eq!(agent.read(LEVEL), Ok(Value::Integer(20)));

    let accepted = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let ChangeNotice::Accepted(event) = accepted else {
        panic!("expected an accepted notice first, got {:?}", accepted);
    };
    assert_eq!(event.identifier_text(), LEVEL);
    assert_eq!(event.value, Value::Integer(45));
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        ChangeNotice::Committed(_)
    ));

    agent.write(&event.identifier_text(), event.value).unwrap();
    assert_eq!(agent.read(LEVEL), Ok(Value::Integer(45)));
}

#[test]
fn test_step_grid_through_set() {
    let (tx, rx) = flume::unbounded::<ChangeNotice>();
    let agent = started_agent(ScriptedBridge::default(), tx);
    register_defaults(&agent);

    let accepted = agent.set(vec![int_binding(LEVEL, 20)]).unwrap();
    assert!(accepted.is_success());

    for rejected in [23, 105] {
        let outcome = agent.set(vec![int_binding(LEVEL, rejected)]).unwrap();
        assert_eq!(outcome.status, ErrorStatus::BadValue);
        assert_eq!(outcome.error_index, 1);
    }

    let notices: Vec<_> = rx.drain().collect();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.event().value == Value::Integer(20)));
}

#[test]
fn test_read_only_rejected_at_type_check() {
    let (tx, rx) = flume::unbounded::<ChangeNotice>();
    let agent = started_agent(ScriptedBridge::default(), tx);
    register_defaults(&agent);

    let outcome = agent.set(vec![text_binding(LABEL, "other")]).unwrap();
    assert_eq!(outcome.status, ErrorStatus::ReadOnly);
    assert_eq!(outcome.error, Some(AgentError::ReadOnly(oid(LABEL))));
    assert_eq!(outcome.phases_for(0), vec![Phase::TypeCheck]);
    assert!(rx.is_empty());
    assert_eq!(agent.read(LABEL), Ok(Value::Text("lab".into())));
}

#[test]
fn test_wrong_wire_type() {
    let agent = started_agent(ScriptedBridge::default(), IgnoreChanges);
    register_defaults(&agent);

    let outcome = agent.set(vec![text_binding(LEVEL, "45")]).unwrap();
    assert_eq!(outcome.status, ErrorStatus::WrongType);

    let outcome = agent.set(vec![int_binding(".1.3.6.1.4.1.42", 1)]).unwrap();
    assert_eq!(outcome.status, ErrorStatus::NoSuchName);
}

#[test]
fn test_batch_value_failure_announces_nothing() {
    let (tx, rx) = flume::unbounded::<ChangeNotice>();
    let agent = started_agent(ScriptedBridge::default(), tx);
    register_defaults(&agent);

    let outcome = agent
        .set(vec![int_binding(LEVEL, 50), int_binding(MODE, 7)])
        .unwrap();
    assert_eq!(outcome.status, ErrorStatus::BadValue);
    assert_eq!(outcome.error_index, 2);
    assert_eq!(
        outcome.phases_for(0),
        vec![Phase::TypeCheck, Phase::ValueCheck, Phase::Free]
    );
    assert!(rx.is_empty());
}

/// Refuses accepted notices for one identifier, records everything else.
struct RefusingListener {
    refuse: Oid,
    seen: Arc<Mutex<Vec<ChangeNotice>>>,
}

impl ChangeListener for RefusingListener {
    fn notify(&self, notice: ChangeNotice) -> std::result::Result<(), ListenerError> {
        if let ChangeNotice::Accepted(event) = &notice
            && event.identifier == self.refuse
        {
            return Err(ListenerError("subscriber gone".into()));
        }
        self.seen.lock().push(notice);
        Ok(())
    }
}

#[test]
fn test_batch_apply_failure_undoes_siblings() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener = RefusingListener {
        refuse: oid(MODE),
        seen: seen.clone(),
    };
    let agent = started_agent(ScriptedBridge::default(), listener);
    register_defaults(&agent);

    let outcome = agent
        .set(vec![int_binding(LEVEL, 50), int_binding(MODE, 2)])
        .unwrap();
    assert_eq!(outcome.status, ErrorStatus::GeneralError);
    assert_eq!(outcome.error_index, 2);

    // Every accepted change has a matching discard.
    let seen = seen.lock();
    let accepted: Vec<_> = seen
        .iter()
        .filter_map(|n| match n {
            ChangeNotice::Accepted(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    let discarded: Vec<_> = seen
        .iter()
        .filter_map(|n| match n {
            ChangeNotice::Discarded(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(accepted, discarded);
    assert_eq!(accepted.len(), 1);
    assert!(!seen.iter().any(|n| matches!(n, ChangeNotice::Committed(_))));
    assert_eq!(
        outcome.phases_for(0),
        vec![Phase::TypeCheck, Phase::ValueCheck, Phase::Apply, Phase::Undo]
    );
}

/// Persist the way a subscriber should: only committed changes are stored.
fn write_back_committed(agent: &Subagent, notices: &[ChangeNotice]) -> usize {
    let mut written = 0;
    for notice in notices {
        if let ChangeNotice::Committed(event) = notice {
            agent.write(&event.identifier_text(), event.value.clone()).unwrap();
            written += 1;
        }
    }
    written
}

#[test]
fn test_only_committed_changes_are_persisted() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener = RefusingListener {
        refuse: oid(MODE),
        seen: seen.clone(),
    };
    let agent = started_agent(ScriptedBridge::default(), listener);
    register_defaults(&agent);

    // LEVEL is accepted, then discarded when MODE fails.
    let outcome = agent
        .set(vec![int_binding(LEVEL, 50), int_binding(MODE, 2)])
        .unwrap();
    assert_eq!(outcome.status, ErrorStatus::GeneralError);
    let notices = std::mem::take(&mut *seen.lock());
    assert!(notices.iter().any(|n| matches!(n, ChangeNotice::Accepted(_))));
    assert_eq!(write_back_committed(&agent, &notices), 0);
    assert_eq!(agent.read(LEVEL), Ok(Value::Integer(20)));

    let outcome = agent.set(vec![int_binding(LEVEL, 50)]).unwrap();
    assert!(outcome.is_success());
    let notices = std::mem::take(&mut *seen.lock());
    assert_eq!(write_back_committed(&agent, &notices), 1);
    assert_eq!(agent.read(LEVEL), Ok(Value::Integer(50)));
}

#[test]
fn test_get_through_bridge() {
    let bridge = ScriptedBridge::default();
    let agent = started_agent(bridge.clone(), IgnoreChanges);
    register_defaults(&agent);

    bridge.push(Request::Get(vec![oid(MODE), oid(LABEL)]));
    bridge.push(Request::Get(vec![oid(LEVEL), oid(".1.3.6.1.4.1.8072.9999.9")]));
    let mut responses = bridge.wait_responses(2).into_iter();

    let found = responses.next().unwrap().into_get();
    assert!(found.is_success());
    assert_eq!(
        found.bindings[0].value,
        WireValue::new(WireType::Integer, 1i32.to_be_bytes())
    );
    assert_eq!(found.bindings[1].value, WireValue::octets("lab"));

    let missing = responses.next().unwrap().into_get();
    assert_eq!(missing.status, ErrorStatus::NoSuchName);
    assert_eq!(missing.error_index, 2);
}
