//! Coarse connectivity status and the decision tree producing it.

use std::fmt;

use super::flags::ReachabilityFlags;

/// Coarse connectivity classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReachabilityStatus {
    Unreachable,
    ReachableWiFi,
    ReachableCellular,
}

impl ReachabilityStatus {
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Unreachable)
    }

    /// Stable human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "No Connection",
            Self::ReachableWiFi => "WiFi",
            Self::ReachableCellular => "Cellular",
        }
    }
}

impl fmt::Display for ReachabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy knobs consulted during classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReachabilityPolicy {
    /// Treat cellular paths as reachable.
    pub allow_cellular: bool,
    /// Running in a simulated or host environment, where cellular
    /// restrictions do not apply.
    pub simulated: bool,
}

impl Default for ReachabilityPolicy {
    fn default() -> Self {
        Self {
            allow_cellular: true,
            simulated: false,
        }
    }
}

/// Classify `flags` under `policy`.
///
/// Pure function of its inputs:
///
/// 1. not reachable → `Unreachable`;
/// 2. a transient link that still needs a connection → `Unreachable`;
/// 3. cellular while cellular is disallowed (outside simulation) →
///    `Unreachable`;
/// 4. otherwise `ReachableCellular` for cellular paths, else
///    `ReachableWiFi`.
pub fn classify(flags: ReachabilityFlags, policy: ReachabilityPolicy) -> ReachabilityStatus {
    if !flags.reachable {
        return ReachabilityStatus::Unreachable;
    }
    if flags.connection_required && flags.transient {
        return ReachabilityStatus::Unreachable;
    }
    if !policy.simulated && flags.is_cellular && !policy.allow_cellular {
        return ReachabilityStatus::Unreachable;
    }
    if flags.is_cellular {
        ReachabilityStatus::ReachableCellular
    } else {
        ReachabilityStatus::ReachableWiFi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const STRICT: ReachabilityPolicy = ReachabilityPolicy {
        allow_cellular: false,
        simulated: false,
    };
    const SIMULATED_STRICT: ReachabilityPolicy = ReachabilityPolicy {
        allow_cellular: false,
        simulated: true,
    };

    fn flags(reachable: bool, required: bool, transient: bool, cellular: bool) -> ReachabilityFlags {
        ReachabilityFlags {
            reachable,
            connection_required: required,
            transient,
            is_cellular: cellular,
            ..ReachabilityFlags::none()
        }
    }

    #[rstest]
    #[case(flags(false, false, false, false), ReachabilityPolicy::default(), ReachabilityStatus::Unreachable)]
    #[case(flags(false, true, true, true), ReachabilityPolicy::default(), ReachabilityStatus::Unreachable)]
    #[case(flags(true, false, false, false), ReachabilityPolicy::default(), ReachabilityStatus::ReachableWiFi)]
    #[case(flags(true, false, true, false), ReachabilityPolicy::default(), ReachabilityStatus::ReachableWiFi)]
    #[case(flags(true, true, false, false), ReachabilityPolicy::default(), ReachabilityStatus::ReachableWiFi)]
    #[case(flags(true, true, true, false), ReachabilityPolicy::default(), ReachabilityStatus::Unreachable)]
    #[case(flags(true, true, true, true), ReachabilityPolicy::default(), ReachabilityStatus::Unreachable)]
    #[case(flags(true, false, false, true), ReachabilityPolicy::default(), ReachabilityStatus::ReachableCellular)]
    #[case(flags(true, false, false, true), STRICT, ReachabilityStatus::Unreachable)]
    #[case(flags(true, false, false, false), STRICT, ReachabilityStatus::ReachableWiFi)]
    #[case(flags(true, false, false, true), SIMULATED_STRICT, ReachabilityStatus::ReachableCellular)]
    fn decision_tree(
        #[case] flags: ReachabilityFlags,
        #[case] policy: ReachabilityPolicy,
        #[case] expected: ReachabilityStatus,
    ) {
        assert_eq!(classify(flags, policy), expected);
    }

    #[rstest]
    fn reachable_without_connection_required_is_never_unreachable() {
        for bits in 0u8..64 {
            let candidate = ReachabilityFlags {
                reachable: true,
                connection_required: false,
                transient: bits & 1 != 0,
                connection_on_demand: bits & 2 != 0,
                intervention_required: bits & 4 != 0,
                is_cellular: bits & 8 != 0,
                is_local: bits & 16 != 0,
                is_direct: bits & 32 != 0,
            };
            assert_ne!(
                classify(candidate, ReachabilityPolicy::default()),
                ReachabilityStatus::Unreachable,
                "{candidate}"
            );
        }
    }

    #[rstest]
    #[case(ReachabilityStatus::Unreachable, "No Connection", false)]
    #[case(ReachabilityStatus::ReachableWiFi, "WiFi", true)]
    #[case(ReachabilityStatus::ReachableCellular, "Cellular", true)]
    fn status_labels(
        #[case] status: ReachabilityStatus,
        #[case] label: &str,
        #[case] reachable: bool,
    ) {
        assert_eq!(status.to_string(), label);
        assert_eq!(status.is_reachable(), reachable);
    }
}
