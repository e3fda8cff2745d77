use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use ledgerdoc_core::asset::Object;
use ledgerdoc_engine::{Configuration, Engine, EngineSettings, Request};
use ledgerdoc_store::MemoryLedger;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Script format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Actor name -> PEM certificate text.
    #[serde(default)]
    pub certificates: BTreeMap<String, String>,
    /// Transaction timestamp of every step; the wall clock when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub init: Option<InitStep>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitStep {
    #[serde(rename = "as")]
    pub actor: String,
    /// Actor whose fingerprint is passed as `init_manager`.
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub input: Object,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    #[serde(rename = "as")]
    pub actor: String,
    pub payload: Value,
    #[serde(default)]
    pub expect: Expect,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    #[default]
    Ok,
    Error,
}

/// Result of one replayed step, printed as a JSON line.
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub method: String,
    /// `ok` or the failure status class.
    pub status: String,
    pub response: Value,
}

/// Read and parse a script file.
pub fn load(path: &Path) -> anyhow::Result<Script> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse script {}", path.display()))
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

pub struct Sandbox {
    engine: Engine<MemoryLedger>,
}

impl Sandbox {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            engine: Engine::new(MemoryLedger::new(), Configuration::builder(settings).build()),
        }
    }

    pub fn engine(&self) -> &Engine<MemoryLedger> {
        &self.engine
    }

    /// Run `script`, stopping at the first step whose outcome differs from
    /// its expectation.
    pub fn run(&self, script: &Script) -> anyhow::Result<Vec<StepOutcome>> {
        let timestamp = script.timestamp.unwrap_or_else(Utc::now);
        let certificate = |actor: &str| -> anyhow::Result<Vec<u8>> {
            script
                .certificates
                .get(actor)
                .map(|pem| pem.as_bytes().to_vec())
                .with_context(|| format!("unknown actor: {actor}"))
        };

        if let Some(init) = &script.init {
            let mut input = init.input.clone();
            if let Some(manager) = &init.manager {
                let fingerprint = self.engine.config().id_func.fingerprint(&certificate(manager)?);
                input.insert("init_manager".into(), json!(fingerprint));
            }
            let request = Request::new(certificate(&init.actor)?, timestamp);
            self.engine.init(&request, input).context("init failed")?;
            tracing::info!(actor = %init.actor, "init applied");
        }

        let mut outcomes = Vec::with_capacity(script.steps.len());
        for (index, step) in script.steps.iter().enumerate() {
            let method = step.payload["method"].as_str().unwrap_or_default().to_string();
            let request = Request::new(certificate(&step.actor)?, timestamp);

            let outcome = match self.engine.handle(&request, step.payload.clone()) {
                Ok(response) => {
                    if step.expect == Expect::Error {
                        bail!("step {index} ({method}) succeeded but an error was expected");
                    }
                    StepOutcome {
                        step: index,
                        method,
                        status: "ok".into(),
                        response,
                    }
                }
                Err(err) => {
                    if step.expect == Expect::Ok {
                        return Err(anyhow::Error::new(err)
                            .context(format!("step {index} ({method}) failed")));
                    }
                    StepOutcome {
                        step: index,
                        method,
                        status: err.status().as_str().to_string(),
                        response: json!({"error": err.to_string()}),
                    }
                }
            };
            tracing::debug!(step = index, method = %outcome.method, status = %outcome.status, "step replayed");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
