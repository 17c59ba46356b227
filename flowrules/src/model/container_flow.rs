//! Container flows: the slice of traffic a container is allowed to program.

use std::fmt;

use super::flow::Flow;
use super::matching::Match;

/// A traffic-slice constraint attached to a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerFlow {
    matching: Match,
}

impl ContainerFlow {
    pub fn new(matching: Match) -> Self {
        Self { matching }
    }

    pub fn matching(&self) -> &Match {
        &self.matching
    }

    /// True if some traffic matched by `flow` falls inside this slice.
    pub fn allows_flow(&self, flow: &Flow) -> bool {
        self.matching.intersects(flow.matching())
    }
}

impl fmt::Display for ContainerFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerFlow[{}]", self.matching)
    }
}
