//! `reap replay` -- run a JSON script of mutations against a fresh registry.
//!
//! A script is an array of steps:
//!
//! ```json
//! [
//!   {"op": "tokenize", "caller": "0xA", "token_id": 1, "name": "Arunga Vineyard",
//!    "size": "294.32ha", "location": "Lyaduywa, Kenya", "image_hash": "Qm...", "soil": "Loam"},
//!   {"op": "transition", "token_id": 1, "state": "Preparation", "caller": "0xA"},
//!   {"op": "transition", "token_id": 1, "state": "Planting", "caller": "0xB",
//!    "expect_error": "unauthorized"},
//!   {"op": "transfer", "token_id": 1, "to": "0xB", "caller": "0xA"}
//! ]
//! ```
//!
//! A step with `expect_error` passes only if it fails with that error kind.

use std::path::Path;

use reap_registry::{FarmRegistry, FarmState, Identity, RegistryError, RegistryEvent, TokenizeRequest};
use reap_storage::MemoryStorage;
use serde::{Deserialize, Serialize};

use crate::OutputFormat;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReplayError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid script {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("registry query failed: {0}")]
    Query(#[from] RegistryError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Step {
    Tokenize {
        caller: String,
        token_id: u64,
        name: String,
        #[serde(default)]
        size: String,
        location: String,
        image_hash: String,
        #[serde(default)]
        soil: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
    Transition {
        token_id: u64,
        state: String,
        caller: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
    Transfer {
        token_id: u64,
        to: String,
        caller: String,
        #[serde(default)]
        expect_error: Option<String>,
    },
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Step::Tokenize { .. } => "tokenize",
            Step::Transition { .. } => "transition",
            Step::Transfer { .. } => "transfer",
        }
    }

    fn token_id(&self) -> u64 {
        match self {
            Step::Tokenize { token_id, .. }
            | Step::Transition { token_id, .. }
            | Step::Transfer { token_id, .. } => *token_id,
        }
    }

    fn expect_error(&self) -> Option<&str> {
        match self {
            Step::Tokenize { expect_error, .. }
            | Step::Transition { expect_error, .. }
            | Step::Transfer { expect_error, .. } => expect_error.as_deref(),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StepOutcome {
    pub(crate) step: usize,
    pub(crate) op: &'static str,
    pub(crate) token_id: u64,
    pub(crate) passed: bool,
    pub(crate) events: Vec<RegistryEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_kind: Option<&'static str>,
}

/// Whole-script result plus the registry totals it left behind.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReplayReport {
    pub(crate) steps: Vec<StepOutcome>,
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    pub(crate) total_supply: u64,
}

pub(crate) fn load_script(path: &Path) -> Result<Vec<Step>, ReplayError> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ReplayError::Parse {
        path: path.display().to_string(),
        source,
    })
}

async fn apply(
    registry: &FarmRegistry<MemoryStorage>,
    step: Step,
) -> Result<Vec<RegistryEvent>, RegistryError> {
    match step {
        Step::Tokenize {
            caller,
            token_id,
            name,
            size,
            location,
            image_hash,
            soil,
            ..
        } => {
            let caller = Identity::new(caller)?;
            let request = TokenizeRequest {
                name,
                size,
                location,
                image_hash,
                soil,
                token_id,
            };
            Ok(registry.tokenize(request, &caller).await?.events)
        }
        Step::Transition {
            token_id,
            state,
            caller,
            ..
        } => {
            let caller = Identity::new(caller)?;
            let state: FarmState = state.parse()?;
            Ok(registry.transition_state(token_id, state, &caller).await?.events)
        }
        Step::Transfer {
            token_id,
            to,
            caller,
            ..
        } => {
            let to = Identity::new(to)?;
            let caller = Identity::new(caller)?;
            Ok(registry.transfer(token_id, &to, &caller).await?.events)
        }
    }
}

/// Run every step in order. A failing step does not stop the script.
pub(crate) async fn run_script(steps: Vec<Step>) -> Result<ReplayReport, ReplayError> {
    let registry = FarmRegistry::new(MemoryStorage::new());
    let mut outcomes = Vec::with_capacity(steps.len());

    for (i, step) in steps.into_iter().enumerate() {
        let op = step.op();
        let token_id = step.token_id();
        let expected = step.expect_error().map(str::to_string);

        let outcome = match (apply(&registry, step).await, expected) {
            (Ok(events), None) => StepOutcome {
                step: i + 1,
                op,
                token_id,
                passed: true,
                events,
                error: None,
                error_kind: None,
            },
            (Ok(events), Some(kind)) => StepOutcome {
                step: i + 1,
                op,
                token_id,
                passed: false,
                events,
                error: Some(format!("expected {} error, but the step succeeded", kind)),
                error_kind: None,
            },
            (Err(e), expected) => StepOutcome {
                step: i + 1,
                op,
                token_id,
                passed: expected.as_deref() == Some(e.kind()),
                events: Vec::new(),
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
            },
        };
        tracing::debug!(step = outcome.step, op, token_id, passed = outcome.passed, "replayed step");
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.passed).count();
    Ok(ReplayReport {
        passed: outcomes.len() - failed,
        failed,
        total_supply: registry.total_supply().await?,
        steps: outcomes,
    })
}

pub(crate) fn print_report(report: &ReplayReport, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("failed to encode report: {}", e),
        },
        OutputFormat::Text => {
            if !quiet {
                for o in &report.steps {
                    let status = if o.passed { "ok" } else { "FAIL" };
                    match &o.error {
                        Some(err) => println!(
                            "{} {} {} token {}: {}",
                            status, o.step, o.op, o.token_id, err
                        ),
                        None => println!(
                            "{} {} {} token {} ({} events)",
                            status,
                            o.step,
                            o.op,
                            o.token_id,
                            o.events.len()
                        ),
                    }
                }
            }
            println!(
                "{} passed, {} failed; total supply {}",
                report.passed, report.failed, report.total_supply
            );
        }
    }
}
