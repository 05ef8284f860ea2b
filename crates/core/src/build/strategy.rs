//! Execution strategy selection

use std::fmt;

use crate::manifest::BuildPhase;

/// How the commands of a phase are run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Directly on the host with `sh -c`
    Host,
    /// On the host inside an isolation wrapper
    Sandboxed,
    /// Inside an ephemeral container
    Containerized,
}

impl ExecutionStrategy {
    /// Pick the strategy for `phase`.
    ///
    /// A container image wins unless `host_only` is set; otherwise the
    /// sandbox flag decides between sandboxed and plain host execution.
    #[must_use]
    pub fn select(phase: &BuildPhase, sandboxed: bool, host_only: bool) -> Self {
        if phase.container_image().is_some() && !host_only {
            Self::Containerized
        } else if sandboxed {
            Self::Sandboxed
        } else {
            Self::Host
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Sandboxed => write!(f, "sandbox"),
            Self::Containerized => write!(f, "container"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ContainerDefinition;

    fn containerized() -> BuildPhase {
        BuildPhase {
            container: Some(ContainerDefinition {
                image: "golang:1.22".into(),
                ..ContainerDefinition::default()
            }),
            ..BuildPhase::default()
        }
    }

    #[test]
    fn test_container_image_selects_container() {
        assert_eq!(
            ExecutionStrategy::select(&containerized(), true, false),
            ExecutionStrategy::Containerized
        );
    }

    #[test]
    fn test_host_only_overrides_container() {
        assert_eq!(
            ExecutionStrategy::select(&containerized(), false, true),
            ExecutionStrategy::Host
        );
        assert_eq!(
            ExecutionStrategy::select(&containerized(), true, true),
            ExecutionStrategy::Sandboxed
        );
    }

    #[test]
    fn test_blank_image_is_not_a_container() {
        let mut phase = containerized();
        if let Some(container) = phase.container.as_mut() {
            container.image = "  ".into();
        }
        assert_eq!(
            ExecutionStrategy::select(&phase, false, false),
            ExecutionStrategy::Host
        );
    }
}
