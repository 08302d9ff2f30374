//! Public vs operational behavior, decided in one place.

use crate::model::{ResolutionType, ScanMode, TokenStatus};

/// What to do with a found token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Render the verification page. The precedence engine is not consulted.
    Verification { resolution_type: ResolutionType },
    /// Run the precedence cascade and redirect.
    Precedence,
    /// Render the internal status view for a terminal token. No redirect.
    InternalStatus { resolution_type: ResolutionType },
}

impl GateDecision {
    pub fn decide(mode: ScanMode, status: TokenStatus) -> Self {
        let terminal = ResolutionType::for_terminal(status);
        match (mode, terminal) {
            (ScanMode::Public, None) => Self::Verification {
                resolution_type: ResolutionType::Verification,
            },
            (ScanMode::Public, Some(resolution_type)) => Self::Verification { resolution_type },
            (ScanMode::Operational, None) => Self::Precedence,
            (ScanMode::Operational, Some(resolution_type)) => {
                Self::InternalStatus { resolution_type }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        use GateDecision::*;
        use ResolutionType as R;

        let verify = |resolution_type| Verification { resolution_type };
        let status_view = |resolution_type| InternalStatus { resolution_type };

        let cases = [
            (ScanMode::Public, TokenStatus::Active, verify(R::Verification)),
            (ScanMode::Public, TokenStatus::Revoked, verify(R::Revoked)),
            (ScanMode::Public, TokenStatus::Expired, verify(R::Expired)),
            (ScanMode::Operational, TokenStatus::Active, Precedence),
            (ScanMode::Operational, TokenStatus::Revoked, status_view(R::Revoked)),
            (ScanMode::Operational, TokenStatus::Expired, status_view(R::Expired)),
        ];
        for (mode, status, want) in cases {
            assert_eq!(GateDecision::decide(mode, status), want, "{mode} {status}");
        }
    }
}
