use std::collections::HashMap;

use azacc_domain::{ArmResourceId, VirtualMachine};
use azacc_fixture::Document;
use regex::Regex;

use crate::error::HarnessError;

// ── Test case ─────────────────────────────────────────────────────────────────

/// An ordered list of steps plus the post-teardown verification.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<TestStep>,
    /// Verify every virtual machine seen during the case is gone after teardown.
    pub check_destroy: bool,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            check_destroy: true,
        }
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestStep {
    pub document: Document,
    /// Run in order after a successful apply; the first failure aborts the case.
    pub checks: Vec<Check>,
    /// When set the apply must fail with a matching message, and no checks run.
    pub expect_error: Option<Regex>,
    /// Destroy everything applied so far instead of applying `document`.
    pub destroy: bool,
}

impl TestStep {
    pub fn apply(document: Document) -> Self {
        Self {
            document,
            checks: Vec::new(),
            expect_error: None,
            destroy: false,
        }
    }

    /// A step that tears everything down, then runs its checks.
    pub fn destroy() -> Self {
        Self {
            destroy: true,
            ..Self::apply(Document::default())
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn expect_error(mut self, pattern: Regex) -> Self {
        self.expect_error = Some(pattern);
        self
    }
}

// ── Checks ────────────────────────────────────────────────────────────────────

/// Assertions run against the cloud after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The VM at `address` in the applied state exists remotely. Its
    /// descriptor is stored under `capture` for later lookups.
    VirtualMachineExists {
        address: String,
        capture: Option<String>,
    },
    /// Resolve `disk_name` on a captured VM and store the managed disk id.
    LookupManagedDiskId {
        vm: String,
        disk_name: String,
        capture: String,
    },
    /// A captured managed disk id does (or does not) exist remotely.
    ManagedDiskExists { disk: String, should_exist: bool },
}

impl Check {
    pub fn vm_exists(address: impl Into<String>, capture: impl Into<String>) -> Self {
        Check::VirtualMachineExists {
            address: address.into(),
            capture: Some(capture.into()),
        }
    }

    pub fn lookup_disk(
        vm: impl Into<String>,
        disk_name: impl Into<String>,
        capture: impl Into<String>,
    ) -> Self {
        Check::LookupManagedDiskId {
            vm: vm.into(),
            disk_name: disk_name.into(),
            capture: capture.into(),
        }
    }

    pub fn disk_exists(disk: impl Into<String>, should_exist: bool) -> Self {
        Check::ManagedDiskExists {
            disk: disk.into(),
            should_exist,
        }
    }
}

/// Values checks hand to later checks within one case.
#[derive(Debug, Default)]
pub struct Captures {
    vms: HashMap<String, VirtualMachine>,
    disks: HashMap<String, ArmResourceId>,
}

impl Captures {
    pub fn insert_vm(&mut self, key: &str, vm: VirtualMachine) {
        self.vms.insert(key.to_string(), vm);
    }

    pub fn insert_disk(&mut self, key: &str, id: ArmResourceId) {
        self.disks.insert(key.to_string(), id);
    }

    pub fn vm(&self, key: &str) -> Result<&VirtualMachine, HarnessError> {
        self.vms
            .get(key)
            .ok_or_else(|| HarnessError::MissingCapture(key.to_string()))
    }

    pub fn disk(&self, key: &str) -> Result<&ArmResourceId, HarnessError> {
        self.disks
            .get(key)
            .ok_or_else(|| HarnessError::MissingCapture(key.to_string()))
    }
}
