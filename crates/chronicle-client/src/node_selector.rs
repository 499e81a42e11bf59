//! Ranking of gossip members against a node preference

use crate::gossip::{ClusterTopology, MemberInfo, MemberState};
use crate::settings::NodePreference;
use std::cmp::Reverse;

/// Picks the member to connect to from a topology snapshot
#[derive(Debug, Clone, Copy)]
pub struct NodeSelector {
    preference: NodePreference,
}

impl NodeSelector {
    pub fn new(preference: NodePreference) -> Self {
        Self { preference }
    }

    pub fn preference(&self) -> NodePreference {
        self.preference
    }

    /// Best member to route to, or `None` when no member is eligible
    pub fn select<'a>(&self, topology: &'a ClusterTopology) -> Option<&'a MemberInfo> {
        self.rank(topology).into_iter().next()
    }

    /// Eligible members, best first
    ///
    /// Members matching the preference come first, then the most recently
    /// seen; remaining ties keep the order the server sent them.
    pub fn rank<'a>(&self, topology: &'a ClusterTopology) -> Vec<&'a MemberInfo> {
        let mut eligible: Vec<&MemberInfo> = topology
            .members()
            .iter()
            .filter(|m| is_eligible(m))
            .collect();

        // stable sort: as-received order breaks the remaining ties
        eligible.sort_by_key(|m| (!self.matches(m.state), Reverse(m.last_seen)));
        eligible
    }

    fn matches(&self, state: MemberState) -> bool {
        match self.preference {
            NodePreference::Leader => state == MemberState::Leader,
            NodePreference::Follower => state == MemberState::Follower,
            NodePreference::ReadOnlyReplica => matches!(
                state,
                MemberState::ReadOnlyReplica | MemberState::ReadOnlyLeaderless
            ),
            NodePreference::Any => true,
        }
    }
}

/// Alive and in a state that serves client traffic
fn is_eligible(member: &MemberInfo) -> bool {
    member.is_alive
        && matches!(
            member.state,
            MemberState::Leader
                | MemberState::Follower
                | MemberState::ReadOnlyReplica
                | MemberState::ReadOnlyLeaderless
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    fn member(host: &str, state: MemberState, alive: bool, last_seen: i64) -> MemberInfo {
        MemberInfo::new(Endpoint::new(host, 2113), state, alive).with_last_seen(last_seen)
    }

    fn abc() -> ClusterTopology {
        ClusterTopology::new(vec![
            member("a", MemberState::Leader, true, 10),
            member("b", MemberState::Follower, true, 10),
            member("c", MemberState::Follower, false, 10),
        ])
    }

    fn selected(preference: NodePreference, topology: &ClusterTopology) -> Option<String> {
        NodeSelector::new(preference)
            .select(topology)
            .map(|m| m.endpoint.host().to_string())
    }

    #[test]
    fn test_leader_preference() {
        assert_eq!(selected(NodePreference::Leader, &abc()).as_deref(), Some("a"));
    }

    #[test]
    fn test_follower_preference_skips_dead() {
        assert_eq!(
            selected(NodePreference::Follower, &abc()).as_deref(),
            Some("b")
        );
        let topology = abc();
        let ranked: Vec<_> = NodeSelector::new(NodePreference::Follower)
            .rank(&topology)
            .into_iter()
            .map(|m| m.endpoint.host())
            .collect();
        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn test_preference_falls_back_to_other_roles() {
        let topology = ClusterTopology::new(vec![
            member("a", MemberState::Follower, true, 1),
            member("b", MemberState::Follower, true, 1),
        ]);
        assert_eq!(
            selected(NodePreference::Leader, &topology).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_read_only_replica_preference() {
        let topology = ClusterTopology::new(vec![
            member("a", MemberState::Leader, true, 1),
            member("r", MemberState::ReadOnlyLeaderless, true, 1),
        ]);
        assert_eq!(
            selected(NodePreference::ReadOnlyReplica, &topology).as_deref(),
            Some("r")
        );
    }

    #[test]
    fn test_manager_and_transitional_states_excluded() {
        let topology = ClusterTopology::new(vec![
            member("m", MemberState::Manager, true, 99),
            member("s", MemberState::ShuttingDown, true, 99),
            member("p", MemberState::PreLeader, true, 99),
            member("u", MemberState::Unknown, true, 99),
        ]);
        assert_eq!(selected(NodePreference::Any, &topology), None);
    }

    #[test]
    fn test_ties_broken_by_last_seen_then_received_order() {
        let topology = ClusterTopology::new(vec![
            member("b1", MemberState::Follower, true, 5),
            member("b2", MemberState::Follower, true, 9),
            member("b3", MemberState::Follower, true, 9),
        ]);
        let ranked: Vec<_> = NodeSelector::new(NodePreference::Follower)
            .rank(&topology)
            .into_iter()
            .map(|m| m.endpoint.host())
            .collect();
        assert_eq!(ranked, vec!["b2", "b3", "b1"]);
    }

    #[test]
    fn test_any_preference_uses_recency() {
        let topology = ClusterTopology::new(vec![
            member("a", MemberState::Leader, true, 1),
            member("b", MemberState::Follower, true, 3),
        ]);
        assert_eq!(selected(NodePreference::Any, &topology).as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_topology() {
        assert_eq!(
            selected(NodePreference::Leader, &ClusterTopology::default()),
            None
        );
    }
}
