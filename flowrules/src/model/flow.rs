//! Flows: a match, a priority and the actions applied to matching packets.

use std::fmt;

use super::matching::Match;
use super::node::PortId;

/// Priority assigned when none is given.
pub const DEFAULT_FLOW_PRIORITY: u16 = 500;

/// Forwarding action applied to matching packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Forward out of a specific port.
    Output(PortId),
    /// Forward out of every port in the flooding domain.
    Flood,
    /// Forward out of every port except the ingress port.
    FloodAll,
    /// Punt to the controller.
    Controller,
    Drop,
    PopVlan,
    SetVlanId(u16),
    SetNwTos(u8),
}

impl Action {
    /// Output port targeted by this action, if any.
    pub fn output_port(&self) -> Option<&PortId> {
        match self {
            Action::Output(port) => Some(port),
            _ => None,
        }
    }

    /// Flood actions reach ports outside any container boundary.
    pub fn is_flood(&self) -> bool {
        matches!(self, Action::Flood | Action::FloodAll)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Output(port) => write!(f, "OUTPUT={}", port),
            Action::Flood => f.write_str("FLOOD"),
            Action::FloodAll => f.write_str("FLOOD_ALL"),
            Action::Controller => f.write_str("CONTROLLER"),
            Action::Drop => f.write_str("DROP"),
            Action::PopVlan => f.write_str("POP_VLAN"),
            Action::SetVlanId(id) => write!(f, "SET_VLAN_ID={}", id),
            Action::SetNwTos(tos) => write!(f, "SET_NW_TOS={}", tos),
        }
    }
}

/// A flow as programmed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Flow {
    matching: Match,
    actions: Vec<Action>,
    priority: u16,
    idle_timeout: u16,
    hard_timeout: u16,
    cookie: u64,
}

impl Flow {
    pub fn new(matching: Match, actions: Vec<Action>) -> Self {
        Self {
            matching,
            actions,
            priority: DEFAULT_FLOW_PRIORITY,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie: 0,
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_idle_timeout(mut self, seconds: u16) -> Self {
        self.idle_timeout = seconds;
        self
    }

    pub fn with_hard_timeout(mut self, seconds: u16) -> Self {
        self.hard_timeout = seconds;
        self
    }

    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn matching(&self) -> &Match {
        &self.matching
    }

    pub fn set_matching(&mut self, matching: Match) {
        self.matching = matching;
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }

    pub fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Appends an action. Returns false if it was already present.
    pub fn add_action(&mut self, action: Action) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        self.actions.push(action);
        true
    }

    /// Removes every occurrence of an action. Returns false if none was present.
    pub fn remove_action(&mut self, action: &Action) -> bool {
        let before = self.actions.len();
        self.actions.retain(|a| a != action);
        self.actions.len() != before
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &PortId> {
        self.actions.iter().filter_map(Action::output_port)
    }

    /// Every port this flow names, ingress match first.
    pub fn referenced_ports(&self) -> Vec<&PortId> {
        self.matching
            .in_port()
            .into_iter()
            .chain(self.output_ports())
            .collect()
    }

    /// True if the flow matches on `port` or outputs to it.
    pub fn references_port(&self, port: &PortId) -> bool {
        self.matching.in_port() == Some(port) || self.output_ports().any(|p| p == port)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flow[{}, priority={}, actions=[", self.matching, self.priority)?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", action)?;
        }
        f.write_str("]]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchField, NodeId};

    #[test]
    fn test_action_edits() {
        let node = NodeId::new("sw1");
        let mut flow = Flow::new(Match::new(), vec![Action::Output(node.port(1))]);

        assert!(!flow.add_action(Action::Output(node.port(1))));
        assert!(flow.add_action(Action::Output(node.port(2))));
        assert_eq!(flow.output_ports().count(), 2);

        assert!(flow.remove_action(&Action::Output(node.port(1))));
        assert!(!flow.remove_action(&Action::Output(node.port(1))));
        assert_eq!(flow.actions(), &[Action::Output(node.port(2))]);
    }

    #[test]
    fn test_references_port() {
        let node = NodeId::new("sw1");
        let flow = Flow::new(
            Match::new().with(MatchField::InPort(node.port(3))),
            vec![Action::Output(node.port(4))],
        );

        assert!(flow.references_port(&node.port(3)));
        assert!(flow.references_port(&node.port(4)));
        assert!(!flow.references_port(&node.port(5)));
        assert_eq!(flow.referenced_ports(), vec![&node.port(3), &node.port(4)]);
    }
}
