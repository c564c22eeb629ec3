use std::collections::BTreeMap;
use std::sync::Arc;

use azacc_config::AccConfig;
use azacc_driver::{ApplyEngine, ComputeClient, ResourceState, State};
use azacc_fixture::VIRTUAL_MACHINE;
use tracing::{error, info, warn};

use crate::case::{Captures, TestCase, TestStep};
use crate::checks::{check_destroyed, run_check};
use crate::error::HarnessError;
use crate::report::{CaseReport, StepOutcome, StepReport};

/// Collaborators a case runs against.
#[derive(Clone)]
pub struct Context {
    pub engine: Arc<dyn ApplyEngine>,
    pub client: Arc<dyn ComputeClient>,
    /// Checked before any step when present; live runs always carry one.
    pub config: Option<AccConfig>,
}

impl Context {
    pub fn new(engine: Arc<dyn ApplyEngine>, client: Arc<dyn ComputeClient>) -> Self {
        Self {
            engine,
            client,
            config: None,
        }
    }

    pub fn with_config(mut self, config: AccConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Drive `case` to completion.
///
/// Steps run strictly in order. The first unexpected error stops the step
/// loop; teardown and the destroy check run regardless.
pub async fn run_case(ctx: &Context, case: &TestCase) -> CaseReport {
    let mut report = CaseReport::start(&case.name, ctx.engine.name());
    info!(case = %case.name, run_id = %report.run_id, engine = ctx.engine.name(), "starting test case");

    if let Some(config) = &ctx.config {
        if let Err(e) = config.precheck() {
            let e = HarnessError::from(e);
            error!(case = %case.name, error = %e, "precheck failed");
            return report.finish(Some(e));
        }
    }

    let mut captures = Captures::default();
    // Every VM any step produced, keyed by id.
    let mut seen_vms: BTreeMap<String, ResourceState> = BTreeMap::new();
    let mut failure: Option<HarnessError> = None;

    for (index, step) in case.steps.iter().enumerate() {
        let number = index + 1;
        match run_step(ctx, step, &mut captures, &mut seen_vms).await {
            Ok(outcome) => {
                info!(case = %case.name, step = number, ?outcome, "step complete");
                report.steps.push(StepReport { number, outcome });
            }
            Err(e) => {
                error!(case = %case.name, step = number, error = %e, "step failed");
                report.steps.push(StepReport {
                    number,
                    outcome: StepOutcome::Failed { message: e.to_string() },
                });
                failure = Some(HarnessError::Step {
                    step: number,
                    source: Box::new(e),
                });
                break;
            }
        }
    }

    if let Err(e) = ctx.engine.destroy().await {
        let e = HarnessError::Teardown(e);
        if failure.is_some() {
            warn!(case = %case.name, error = %e, "teardown failed after earlier failure");
        } else {
            failure = Some(e);
        }
    }

    if case.check_destroy {
        if let Err(e) = check_destroyed(ctx.client.as_ref(), seen_vms.values()).await {
            let e = HarnessError::CheckDestroy(Box::new(e));
            if failure.is_some() {
                warn!(case = %case.name, error = %e, "destroy check failed after earlier failure");
            } else {
                failure = Some(e);
            }
        }
    }

    let report = report.finish(failure);
    match &report.failure {
        None => info!(case = %case.name, "test case passed"),
        Some(f) => warn!(case = %case.name, kind = ?f.kind, "test case failed"),
    }
    report
}

async fn run_step(
    ctx: &Context,
    step: &TestStep,
    captures: &mut Captures,
    seen_vms: &mut BTreeMap<String, ResourceState>,
) -> Result<StepOutcome, HarnessError> {
    if step.destroy {
        ctx.engine.destroy().await.map_err(HarnessError::Teardown)?;
        run_checks(ctx, step, &State::default(), captures).await?;
        return Ok(StepOutcome::Destroyed);
    }

    let applied = ctx.engine.apply(&step.document).await;
    if let Ok(state) = &applied {
        for vm in state.of_type(VIRTUAL_MACHINE) {
            seen_vms.insert(vm.id.clone(), vm.clone());
        }
    }

    match (applied, &step.expect_error) {
        (Ok(state), None) => {
            run_checks(ctx, step, &state, captures).await?;
            Ok(StepOutcome::Applied {
                resources: state.resources.len(),
            })
        }
        (Ok(_), Some(pattern)) => Err(HarnessError::ExpectedErrorMissing {
            pattern: pattern.as_str().to_string(),
        }),
        (Err(e), Some(pattern)) => {
            let message = e.to_string();
            if pattern.is_match(&message) {
                Ok(StepOutcome::ExpectedError { message })
            } else {
                Err(HarnessError::ExpectedErrorMismatch {
                    pattern: pattern.as_str().to_string(),
                    message,
                })
            }
        }
        (Err(e), None) => Err(HarnessError::UnexpectedApplyError(e)),
    }
}

async fn run_checks(
    ctx: &Context,
    step: &TestStep,
    state: &State,
    captures: &mut Captures,
) -> Result<(), HarnessError> {
    for check in &step.checks {
        run_check(check, state, ctx.client.as_ref(), captures).await?;
    }
    Ok(())
}
