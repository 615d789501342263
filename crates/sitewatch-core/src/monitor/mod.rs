pub mod cycle;
pub mod error;
pub mod policy;
pub mod state;
pub mod supervisor;
pub mod task;

pub use cycle::{run_cycle, CheckReport, CycleOutcome, MonitorContext};
pub use error::CycleError;
pub use policy::{AlertDecision, AlertPolicy};
pub use state::TaskState;
pub use supervisor::{Supervisor, SweepReport};
pub use task::{MonitorTask, TaskHandle};
