#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregator;
pub mod check;
pub mod context;
pub mod error;
pub mod scenario;
pub mod setup;
pub mod transaction;
pub mod variant;

pub(crate) mod mixer;
pub(crate) mod scheduler;
pub(crate) mod vu;

pub use aggregator::{Aggregator, Sample};
pub use error::{RunError, SetupError, WorkloadError};
pub use scenario::Scenario;
pub use tempo_core::*;

pub mod prelude {
    pub use crate::check::{Check, CheckResult};
    pub use crate::context::SharedContext;
    pub use crate::error::RunError;
    pub use crate::scenario::{ConfigurableScenario, Scenario};
    pub use crate::setup::Setup;
    pub use crate::transaction::{timed, Outcome, Response, Transport};
    pub use crate::variant::Variant;

    pub use tempo_core::{DrainPolicy, RunStatistics, ScenarioConfig};
}
