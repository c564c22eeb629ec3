use std::sync::Arc;

use async_trait::async_trait;
use azacc_config::load_with_env;
use azacc_driver::{ApplyEngine, ApplyError, LocalCloud, State};
use azacc_fixture::{generate, Document, Names, Seed, Variant};
use azacc_harness::{
    run_case, scenarios, Check, Context, FailureKind, Scenario, StepOutcome, TestCase, TestStep,
};
use regex::Regex;

const LOCATION: &str = "westus";
const VM_ADDRESS: &str = "azurerm_virtual_machine.test";

fn local() -> (LocalCloud, Context) {
    let cloud = LocalCloud::new();
    let ctx = Context::new(Arc::new(cloud.clone()), Arc::new(cloud.clone()));
    (cloud, ctx)
}

fn doc(seed: u64, variant: Variant) -> Document {
    generate(&Seed::from_int(seed), LOCATION, variant)
}

#[tokio::test]
async fn every_scenario_passes_on_local_cloud() {
    let cases = scenarios::all(&Seed::from_int(4242), LOCATION).unwrap();
    for case in &cases {
        let (cloud, ctx) = local();
        let report = run_case(&ctx, case).await;
        assert!(report.passed(), "{} failed: {:?}", case.name, report.failure);
        assert_eq!(report.steps.len(), case.steps.len());
        assert_eq!(cloud.object_count().await, 0, "{} leaked resources", case.name);
    }
}

#[tokio::test]
async fn conflict_scenarios_record_the_expected_error() {
    let (_, ctx) = local();
    let case = Scenario::DataDiskTypeConflict
        .build(&Seed::from_int(11), LOCATION)
        .unwrap();
    let report = run_case(&ctx, &case).await;
    assert!(report.passed());
    match &report.steps[0].outcome {
        StepOutcome::ExpectedError { message } => {
            assert!(message.contains("Conflict between `vhd_uri`"));
            assert!(message.contains("storage_data_disk"));
        }
        other => panic!("expected ExpectedError, got {:?}", other),
    }
}

#[tokio::test]
async fn captured_disk_is_gone_after_destroy_step() {
    let (_, ctx) = local();
    let case = TestCase::new("destroy-step")
        .step(
            TestStep::apply(doc(12, Variant::DataDiskImplicit))
                .check(Check::vm_exists(VM_ADDRESS, "vm"))
                .check(Check::lookup_disk("vm", "myosdisk1", "osd")),
        )
        .step(TestStep::destroy().check(Check::disk_exists("osd", false)));

    let report = run_case(&ctx, &case).await;
    assert!(report.passed(), "{:?}", report.failure);
    assert!(matches!(report.steps[1].outcome, StepOutcome::Destroyed));
}

#[tokio::test]
async fn unexpected_conflict_is_a_configuration_conflict() {
    let (_, ctx) = local();
    let case = TestCase::new("conflict").step(TestStep::apply(doc(13, Variant::OsDiskTypeConflict)));
    let report = run_case(&ctx, &case).await;

    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ConfigurationConflict);
    assert!(failure.message.starts_with("Step 1 error: "));
    assert!(failure.message.contains("Conflict between `vhd_uri` and `managed_disk_type`"));
    assert!(matches!(report.steps[0].outcome, StepOutcome::Failed { .. }));
}

#[tokio::test]
async fn expected_error_that_never_happens_fails() {
    let (cloud, ctx) = local();
    let case = TestCase::new("missing-error").step(
        TestStep::apply(doc(14, Variant::NetworkOnly))
            .expect_error(Regex::new("Conflict between").unwrap()),
    );
    let report = run_case(&ctx, &case).await;
    assert_eq!(report.failure.unwrap().kind, FailureKind::ExpectedErrorMissing);
    // Whatever the step created is still torn down.
    assert_eq!(cloud.object_count().await, 0);
}

#[tokio::test]
async fn expected_error_with_other_text_fails() {
    let (_, ctx) = local();
    let case = TestCase::new("mismatch").step(
        TestStep::apply(doc(15, Variant::OsDiskTypeConflict))
            .expect_error(Regex::new("quota exceeded").unwrap()),
    );
    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ExpectedErrorMismatch);
    assert!(failure.message.contains("no match on:"));
}

#[tokio::test]
async fn missing_disk_name_reports_not_found_and_stops() {
    let (cloud, ctx) = local();
    let names = Names::new(&Seed::from_int(16));
    let case = TestCase::new("missing-disk")
        .step(
            TestStep::apply(doc(16, Variant::ManagedDiskImplicit))
                .check(Check::vm_exists(VM_ADDRESS, "vm"))
                .check(Check::lookup_disk("vm", "mydatadisk1", "dtd")),
        )
        .step(TestStep::apply(doc(16, Variant::NetworkOnly)));

    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::NotFound);
    assert!(failure.message.contains(&format!(
        "Unable to locate disk mydatadisk1 on vm {}",
        names.virtual_machine()
    )));
    // The second step never ran, but teardown did.
    assert_eq!(report.steps.len(), 1);
    assert_eq!(cloud.object_count().await, 0);
}

#[tokio::test]
async fn surviving_disk_fails_an_opt_in_expectation() {
    let (_, ctx) = local();
    let case = TestCase::new("wrong-expectation")
        .step(
            TestStep::apply(doc(17, Variant::DataDiskImplicit))
                .check(Check::vm_exists(VM_ADDRESS, "vm"))
                .check(Check::lookup_disk("vm", "myosdisk1", "osd")),
        )
        .step(TestStep::apply(doc(17, Variant::NetworkOnly)).check(Check::disk_exists("osd", false)));

    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::UnexpectedResource);
    assert!(failure.message.contains("Found unexpected Managed Disk /subscriptions/"));
}

#[tokio::test]
async fn transport_errors_are_lookup_failures() {
    let cloud = LocalCloud::new();
    let broken = LocalCloud::new();
    broken.set_unavailable(true).await;
    let ctx = Context::new(Arc::new(cloud.clone()), Arc::new(broken));

    let case = TestCase::new("transport")
        .step(TestStep::apply(doc(18, Variant::ManagedDiskExplicit)).check(Check::vm_exists(VM_ADDRESS, "vm")));
    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::LookupFailure);
    assert!(failure.message.contains("local cloud unavailable"));
}

#[tokio::test]
async fn precheck_failure_stops_before_any_apply() {
    let (cloud, ctx) = local();
    let config = load_with_env(None, |_: &str| None).unwrap();
    let ctx = ctx.with_config(config);

    let case = Scenario::BasicLinuxMachineManagedDiskExplicit
        .build(&Seed::from_int(19), LOCATION)
        .unwrap();
    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::Precheck);
    assert!(failure.message.contains("ARM_SUBSCRIPTION_ID must be set for acceptance tests"));
    assert!(report.steps.is_empty());
    assert!(cloud.state().await.is_empty());
}

/// Applies normally but never tears anything down.
struct LeakyEngine(LocalCloud);

#[async_trait]
impl ApplyEngine for LeakyEngine {
    fn name(&self) -> &'static str {
        "leaky"
    }

    async fn apply(&self, document: &Document) -> Result<State, ApplyError> {
        self.0.apply(document).await
    }

    async fn destroy(&self) -> Result<(), ApplyError> {
        Ok(())
    }
}

#[tokio::test]
async fn check_destroy_catches_leaked_machines() {
    let cloud = LocalCloud::new();
    let ctx = Context::new(Arc::new(LeakyEngine(cloud.clone())), Arc::new(cloud.clone()));
    let case = Scenario::BugAzureRm33.build(&Seed::from_int(20), LOCATION).unwrap();

    let report = run_case(&ctx, &case).await;
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::UnexpectedResource);
    assert!(failure.message.starts_with("Check failed: Virtual Machine still exists: "));
    assert_eq!(report.engine, "leaky");

    cloud.destroy().await.unwrap();
}

#[tokio::test]
async fn report_serialises_with_tagged_outcomes() {
    let (_, ctx) = local();
    let case = Scenario::OsDiskTypeConflict.build(&Seed::from_int(21), LOCATION).unwrap();
    let report = run_case(&ctx, &case).await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["case"], "os-disk-type-conflict");
    assert_eq!(json["steps"][0]["kind"], "expected_error");
    assert_eq!(json["steps"][0]["number"], 1);
    assert!(json["failure"].is_null());
    assert!(report.duration_ms().is_some());
}
