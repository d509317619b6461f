use crate::transaction::Outcome;
use std::fmt;
use std::sync::Arc;

/// A named predicate evaluated against every outcome of a variant.
///
/// Checks are observational: a failing check is counted, it never fails the iteration.
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Arc<dyn Fn(&Outcome) -> bool + Send + Sync>,
}

impl Check {
    pub fn new<P>(name: &str, predicate: P) -> Self
    where
        P: Fn(&Outcome) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            predicate: Arc::new(predicate),
        }
    }

    /// Passes when the response carries exactly `status`.
    pub fn status(name: &str, status: u16) -> Self {
        Self::new(name, move |outcome| outcome.status == Some(status))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, outcome: &Outcome) -> CheckResult {
        CheckResult {
            name: self.name.clone(),
            passed: (self.predicate)(outcome),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}
