pub mod case;
pub mod checks;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;

pub use case::{Captures, Check, TestCase, TestStep};
pub use error::{FailureKind, HarnessError};
pub use report::{CaseReport, Failure, StepOutcome, StepReport};
pub use runner::{run_case, Context};
pub use scenarios::{Scenario, CONFLICT_PATTERN};
