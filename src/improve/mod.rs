//! Description improvement: classify eval failures and ask the agent CLI to
//! rewrite the skill description.

pub mod classifier;
pub mod improver;

pub use classifier::{build_improvement_prompt, classify_failures, FailureSplit};
pub use improver::{CliImprover, ImproveOutcome, ImproveRequest, Improver};
