//! Canonical stage derivation.
//!
//! An application's maturity stage selects which question set applies.
//! The raw indicator is free text scattered across several legacy
//! locations; `classifier` turns it into one of a small closed set.

pub mod classifier;

use serde::{Deserialize, Serialize};

pub use classifier::{classify, StageClassification};

/// The closed set of applicant maturity stages.
///
/// Derived on demand from an application's raw stage indicator; never
/// persisted independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStage {
    IdeaStage,
    MvpStage,
    EarlyRevenue,
}

impl CanonicalStage {
    pub const ALL: &'static [CanonicalStage] = &[
        CanonicalStage::IdeaStage,
        CanonicalStage::MvpStage,
        CanonicalStage::EarlyRevenue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStage::IdeaStage => "idea_stage",
            CanonicalStage::MvpStage => "mvp_stage",
            CanonicalStage::EarlyRevenue => "early_revenue",
        }
    }
}

impl std::fmt::Display for CanonicalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(CanonicalStage::IdeaStage.as_str(), "idea_stage");
        assert_eq!(CanonicalStage::MvpStage.as_str(), "mvp_stage");
        assert_eq!(CanonicalStage::EarlyRevenue.as_str(), "early_revenue");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&CanonicalStage::MvpStage).unwrap();
        assert_eq!(json, "\"mvp_stage\"");
        let back: CanonicalStage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CanonicalStage::MvpStage);
    }
}
