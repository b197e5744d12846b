//! Snapshot of connectivity bits reported by a flag source.

use std::fmt;

use serde::Serialize;

/// Connectivity characteristics of the network path at one point in time.
///
/// Values are compared as a whole when debouncing: two snapshots with the
/// same bits are the same signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ReachabilityFlags {
    /// The target can be reached with the current configuration.
    pub reachable: bool,
    /// A connection must be established first.
    pub connection_required: bool,
    /// The path is transient, e.g. a dial-up style link being set up.
    pub transient: bool,
    /// The connection would be established on demand or on traffic.
    pub connection_on_demand: bool,
    /// User intervention is required to establish the connection.
    pub intervention_required: bool,
    /// The path goes through a cellular interface.
    pub is_cellular: bool,
    /// The target is a local address.
    pub is_local: bool,
    /// The target is reached without a gateway.
    pub is_direct: bool,
}

impl ReachabilityFlags {
    /// No bits set: nothing is reachable.
    pub const fn none() -> Self {
        Self {
            reachable: false,
            connection_required: false,
            transient: false,
            connection_on_demand: false,
            intervention_required: false,
            is_cellular: false,
            is_local: false,
            is_direct: false,
        }
    }

    /// Reachable over a non-cellular interface.
    pub const fn wifi() -> Self {
        Self {
            reachable: true,
            ..Self::none()
        }
    }

    /// Reachable over a cellular interface.
    pub const fn cellular() -> Self {
        Self {
            reachable: true,
            is_cellular: true,
            ..Self::none()
        }
    }

    /// Connection required, established automatically on demand or traffic.
    pub fn is_connection_on_demand(&self) -> bool {
        self.connection_required && self.connection_on_demand
    }

    /// Connection required and needs the user to act.
    pub fn is_intervention_required(&self) -> bool {
        self.connection_required && self.intervention_required
    }
}

/// Renders the bits as `WR tcDild`, with `-` for every unset bit.
impl fmt::Display for ReachabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{} {}{}{}{}{}{}",
            bit(self.is_cellular, 'W'),
            bit(self.reachable, 'R'),
            bit(self.transient, 't'),
            bit(self.connection_required, 'c'),
            bit(self.connection_on_demand, 'D'),
            bit(self.intervention_required, 'i'),
            bit(self.is_local, 'l'),
            bit(self.is_direct, 'd'),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ReachabilityFlags::none(), "-- ------")]
    #[case(ReachabilityFlags::wifi(), "-R ------")]
    #[case(ReachabilityFlags::cellular(), "WR ------")]
    #[case(
        ReachabilityFlags {
            transient: true,
            connection_required: true,
            connection_on_demand: true,
            intervention_required: true,
            is_local: true,
            is_direct: true,
            ..ReachabilityFlags::wifi()
        },
        "-R tcDild"
    )]
    fn renders_compact_string(#[case] flags: ReachabilityFlags, #[case] expected: &str) {
        assert_eq!(flags.to_string(), expected);
    }

    #[rstest]
    fn on_demand_requires_connection_required() {
        let flags = ReachabilityFlags {
            connection_on_demand: true,
            intervention_required: true,
            ..ReachabilityFlags::wifi()
        };
        assert!(!flags.is_connection_on_demand());
        assert!(!flags.is_intervention_required());

        let required = ReachabilityFlags {
            connection_required: true,
            ..flags
        };
        assert!(required.is_connection_on_demand());
        assert!(required.is_intervention_required());
    }
}
