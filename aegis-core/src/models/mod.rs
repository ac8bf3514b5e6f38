mod alert;
mod playbook;
mod run;
mod stats;

pub use alert::{Alert, AlertStatus, NewAlert, Severity};
pub use playbook::{Playbook, Step, StepAction, TriggerCondition};
pub use run::{ExecutionRun, FailureCause, RunState, StepOutcome, StepResult};
pub use stats::StatSnapshot;
