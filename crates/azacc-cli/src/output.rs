use azacc_fixture::{FixtureError, ResolvedDocument, Variant};
use azacc_harness::{CaseReport, StepOutcome};

/// One line per fixture: whether it validated, and whether that was expected.
pub fn render_validation(
    variant: Variant,
    result: &Result<ResolvedDocument, FixtureError>,
    expect_rejection: bool,
) -> String {
    match (result, expect_rejection) {
        (Ok(resolved), false) => {
            format!("ok       {} ({} resource(s))", variant, resolved.creation_order.len())
        }
        (Ok(_), true) => format!("UNEXPECTED {}: validated but should have been rejected", variant),
        (Err(e), true) => format!("rejected {}: {}", variant, e),
        (Err(e), false) => format!("INVALID  {}: {}", variant, e),
    }
}

/// Human-readable run summary.
pub fn render_reports(reports: &[CaseReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let status = if report.passed() { "PASS" } else { "FAIL" };
        let took = report
            .duration_ms()
            .map(|ms| format!(", {} ms", ms))
            .unwrap_or_default();
        out.push_str(&format!("{} {} ({}{})\n", status, report.case, report.engine, took));

        for step in &report.steps {
            let line = match &step.outcome {
                StepOutcome::Applied { resources } => format!("applied {} resource(s)", resources),
                StepOutcome::ExpectedError { .. } => "failed as expected".to_string(),
                StepOutcome::Destroyed => "destroyed".to_string(),
                StepOutcome::Failed { message } => format!("failed: {}", first_line(message)),
            };
            out.push_str(&format!("  step {}: {}\n", step.number, line));
        }
        if let Some(failure) = &report.failure {
            out.push_str(&format!("  ! {:?}: {}\n", failure.kind, failure.message));
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    out.push_str(&format!(
        "\n{} passed, {} failed.\n",
        reports.len() - failed,
        failed
    ));
    out
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}
