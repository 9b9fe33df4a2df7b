use serde::{Deserialize, Serialize};
use std::fmt;

/// Instance lifecycle states.
///
/// Status is monotone into the terminal set: no transition ever leaves
/// Completed, Cancelled, or Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created by submission, waiting for its first approval
    #[default]
    Draft,
    /// Moving through the definition's steps
    Processing,
    /// Final step approved
    Completed,
    /// Revoked by the creator or cancelled by an approver
    Cancelled,
    /// Rejected at some step; the step is frozen at the point of rejection
    Rejected,
}

impl InstanceStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Check if the instance is actively moving through steps
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Draft | Self::Processing)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid instance status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(!InstanceStatus::Draft.is_terminal());
        assert!(!InstanceStatus::Processing.is_terminal());
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(InstanceStatus::Processing.to_string(), "processing");
        assert_eq!(
            "rejected".parse::<InstanceStatus>().unwrap(),
            InstanceStatus::Rejected
        );
        assert!("archived".parse::<InstanceStatus>().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let status = InstanceStatus::Processing;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(serde_json::from_str::<InstanceStatus>(&json).unwrap(), status);
    }
}
