use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use snmp_subagent::definitions::{
    Definition, load_definitions_file, load_definitions_str, register_all,
};
use snmp_subagent::prelude::*;
use snmp_subagent::validate::validate;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const SAMPLE_DEFINITIONS: &str = r#"
parameters:
  - oid: ".1.3.6.1.4.1.8072.9999.1"
    kind: integer
    limits: [0, 100]
    step: 5
    initial: 20
  - oid: ".1.3.6.1.4.1.8072.9999.2"
    kind: enumerated
    permitted: [1, 2, 4]
    initial: 1
  - oid: ".1.3.6.1.4.1.8072.9999.3"
    kind: real
    limits: [0.0, 1.0]
    step: 0.25
    initial: 0.5
  - oid: ".1.3.6.1"
    kind: text
    read_only: true
    initial: "demo"
"#;

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long, help = "YAML parameter definitions (built-in sample if omitted)")]
    definitions: Option<PathBuf>,

    #[arg(short, long, help = "JSON5 agent configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short,
        long = "set",
        value_name = "OID=VALUE",
        help = "Set request sent through the loopback bridge (repeatable)"
    )]
    sets: Vec<String>,

    #[arg(long, help = "Enable debug logging")]
    debug: bool,
}

/// Bridge that plays the manager side: set requests queued by `main` are
/// encoded and handed to the agent on the next poll.
struct LoopbackBridge {
    requests: flume::Receiver<(Oid, ValueKind, String)>,
}

impl AgentBridge for LoopbackBridge {
    fn init(&mut self, config: &AgentConfig) -> Result<()> {
        info!("[DEMO] loopback bridge for {} at {}", config.agent_name, config.master_address);
        Ok(())
    }

    fn attach(&mut self, identifier: &Oid) -> Result<()> {
        info!("[DEMO] serving {}", identifier);
        Ok(())
    }

    fn poll(&mut self, handler: &mut RequestHandler<'_>) -> Result<()> {
        for (identifier, kind, text) in self.requests.try_iter() {
            // Only the type conversion happens here; constraints are the
            // agent's business.
            let untyped = ValueDescriptor::new(identifier.to_string(), kind);
            let value = match validate(&untyped, &Candidate::from(text.as_str())) {
                Ok(value) => value,
                Err(e) => {
                    warn!("[DEMO] cannot encode {} for {}: {}", text, identifier, e);
                    continue;
                }
            };
            let binding = VarBind::new(identifier.clone(), handler.codec().encode(&value));
            let outcome = handler.set(&[binding]);
            info!(
                "[DEMO] set {} = {} -> {} (index {})",
                identifier, text, outcome.status, outcome.error_index
            );
        }
        Ok(())
    }
}

fn init_logger(debug: bool) {
    let filter = if debug {
        EnvFilter::new("snmp_subagent=debug,subagent_demo=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("snmp_subagent=info,subagent_demo=info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.debug);

    let definitions: Vec<Definition> = match &args.definitions {
        Some(path) => load_definitions_file(path)?,
        None => load_definitions_str(SAMPLE_DEFINITIONS)?,
    };
    let kinds: BTreeMap<String, ValueKind> = definitions
        .iter()
        .map(|d| (d.descriptor.identifier().to_string(), d.descriptor.kind()))
        .collect();

    let mut config = AgentConfigBuilder::default();
    if let Some(path) = &args.config {
        config = config.with_config_file(path);
    }

    let (request_tx, request_rx) = flume::unbounded();
    let (notice_tx, notice_rx) = flume::unbounded::<ChangeNotice>();
    let agent = Subagent::builder()
        .with_config(config.build()?)
        .with_bridge(LoopbackBridge {
            requests: request_rx,
        })
        .with_listener(notice_tx)
        .build()?;

    agent.start()?;
    agent.wait_ready()?;
    let registered = register_all(&agent, definitions)?;
    info!("[DEMO] registered {} parameters", registered);

    for set in &args.sets {
        let Some((identifier, value)) = set.split_once('=') else {
            warn!("[DEMO] ignoring '{}', expected OID=VALUE", set);
            continue;
        };
        let Some(kind) = kinds.get(identifier) else {
            warn!("[DEMO] ignoring '{}', unknown OID", set);
            continue;
        };
        let _ = request_tx.send((identifier.parse()?, *kind, value.to_string()));
    }

    // This side owns persistence. Only committed changes are written back;
    // an accepted change may still be discarded by a failing sibling.
    while let Ok(notice) = notice_rx.recv_timeout(Duration::from_millis(500)) {
        match notice {
            ChangeNotice::Accepted(event) => info!("[DEMO] accepted {}", event),
            ChangeNotice::Committed(event) => {
                info!("[DEMO] committed {}", event);
                if let Err(e) = agent.write(&event.identifier_text(), event.value.clone()) {
                    warn!("[DEMO] write-back of {} failed: {}", event, e);
                }
            }
            ChangeNotice::Discarded(event) => info!("[DEMO] discarded {}", event),
        }
    }

    for identifier in agent.identifiers()? {
        let value = agent.read(&identifier.to_string())?;
        println!("{} = {}", identifier, value);
    }

    agent.stop()
}
