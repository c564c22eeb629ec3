use std::str::FromStr;

use azacc_fixture::{generate, Document, Seed, Variant, VIRTUAL_MACHINE};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::case::{Check, TestCase, TestStep};
use crate::error::HarnessError;

/// Text the provider reports when a disk block mixes `vhd_uri` with managed fields.
pub const CONFLICT_PATTERN: &str = "Conflict between `vhd_uri`";

const VM: &str = "vm";
const OS_DISK: &str = "myosdisk1";
const DATA_DISK: &str = "mydatadisk1";

// ── Catalogue ─────────────────────────────────────────────────────────────────

/// The managed-disk acceptance cases for the virtual machine resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    BasicLinuxMachineManagedDiskExplicit,
    BasicLinuxMachineManagedDiskImplicit,
    BasicLinuxMachineManagedDiskAttach,
    WithDataDiskManagedDiskExplicit,
    WithDataDiskManagedDiskImplicit,
    DeleteManagedDiskOptOut,
    DeleteManagedDiskOptIn,
    OsDiskTypeConflict,
    DataDiskTypeConflict,
    BugAzureRm33,
}

impl Scenario {
    pub const ALL: [Scenario; 10] = [
        Scenario::BasicLinuxMachineManagedDiskExplicit,
        Scenario::BasicLinuxMachineManagedDiskImplicit,
        Scenario::BasicLinuxMachineManagedDiskAttach,
        Scenario::WithDataDiskManagedDiskExplicit,
        Scenario::WithDataDiskManagedDiskImplicit,
        Scenario::DeleteManagedDiskOptOut,
        Scenario::DeleteManagedDiskOptIn,
        Scenario::OsDiskTypeConflict,
        Scenario::DataDiskTypeConflict,
        Scenario::BugAzureRm33,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::BasicLinuxMachineManagedDiskExplicit => "basic-linux-machine-managed-disk-explicit",
            Scenario::BasicLinuxMachineManagedDiskImplicit => "basic-linux-machine-managed-disk-implicit",
            Scenario::BasicLinuxMachineManagedDiskAttach => "basic-linux-machine-managed-disk-attach",
            Scenario::WithDataDiskManagedDiskExplicit => "with-data-disk-managed-disk-explicit",
            Scenario::WithDataDiskManagedDiskImplicit => "with-data-disk-managed-disk-implicit",
            Scenario::DeleteManagedDiskOptOut => "delete-managed-disk-opt-out",
            Scenario::DeleteManagedDiskOptIn => "delete-managed-disk-opt-in",
            Scenario::OsDiskTypeConflict => "os-disk-type-conflict",
            Scenario::DataDiskTypeConflict => "data-disk-type-conflict",
            Scenario::BugAzureRm33 => "bug-azurerm-33",
        }
    }

    /// Build the test case. Names are derived from `seed`.
    pub fn build(&self, seed: &Seed, location: &str) -> Result<TestCase, HarnessError> {
        let doc = |variant| generate(seed, location, variant);
        let case = TestCase::new(self.name());

        Ok(match self {
            Scenario::BasicLinuxMachineManagedDiskExplicit => {
                case.step(TestStep::apply(doc(Variant::ManagedDiskExplicit)).check(vm_exists()))
            }
            Scenario::BasicLinuxMachineManagedDiskImplicit => {
                case.step(TestStep::apply(doc(Variant::ManagedDiskImplicit)).check(vm_exists()))
            }
            Scenario::BasicLinuxMachineManagedDiskAttach => {
                case.step(TestStep::apply(doc(Variant::ManagedDiskAttach)).check(vm_exists()))
            }
            Scenario::WithDataDiskManagedDiskExplicit => {
                case.step(TestStep::apply(doc(Variant::DataDiskExplicit)).check(vm_exists()))
            }
            Scenario::WithDataDiskManagedDiskImplicit => {
                case.step(TestStep::apply(doc(Variant::DataDiskImplicit)).check(vm_exists()))
            }
            Scenario::DeleteManagedDiskOptOut => {
                disk_survival(case, doc(Variant::DataDiskImplicit), doc(Variant::NetworkOnly), true)
            }
            Scenario::DeleteManagedDiskOptIn => disk_survival(
                case,
                doc(Variant::DestroyDisksBefore),
                doc(Variant::NetworkOnly),
                false,
            ),
            Scenario::OsDiskTypeConflict => case.step(
                TestStep::apply(doc(Variant::OsDiskTypeConflict)).expect_error(conflict()?),
            ),
            Scenario::DataDiskTypeConflict => case.step(
                TestStep::apply(doc(Variant::DataDiskTypeConflict)).expect_error(conflict()?),
            ),
            Scenario::BugAzureRm33 => case.step(TestStep::apply(doc(Variant::WindowsMachine))),
        })
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| format!("unknown scenario {:?}", s))
    }
}

/// Every scenario, each on its own seed so they can run side by side.
pub fn all(seed: &Seed, location: &str) -> Result<Vec<TestCase>, HarnessError> {
    Scenario::ALL
        .iter()
        .enumerate()
        .map(|(i, scenario)| scenario.build(&seed.offset(i as u64), location))
        .collect()
}

// ── Building blocks ───────────────────────────────────────────────────────────

fn vm_exists() -> Check {
    Check::vm_exists(format!("{}.test", VIRTUAL_MACHINE), VM)
}

fn conflict() -> Result<Regex, HarnessError> {
    Ok(Regex::new(&regex::escape(CONFLICT_PATTERN))?)
}

/// Provision a VM, capture its disk ids, replace it with a network-only
/// document and check whether the disks outlived it.
fn disk_survival(case: TestCase, before: Document, after: Document, survive: bool) -> TestCase {
    case.step(
        TestStep::apply(before)
            .check(vm_exists())
            .check(Check::lookup_disk(VM, OS_DISK, "osd"))
            .check(Check::lookup_disk(VM, DATA_DISK, "dtd")),
    )
    .step(
        TestStep::apply(after)
            .check(Check::disk_exists("osd", survive))
            .check(Check::disk_exists("dtd", survive)),
    )
}
