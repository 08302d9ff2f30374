use serde::{Deserialize, Serialize};

use super::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestResult {
    Pending,
    Pass,
    Fail,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// Transparency record header. The content model belongs to the
/// transparency module; resolution only needs the visibility projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyRecord {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub test_result: TestResult,
    pub published: bool,
}

impl TransparencyRecord {
    /// Publicly visible: passed testing and published.
    pub fn is_publicly_visible(&self) -> bool {
        self.published && self.test_result == TestResult::Pass
    }
}
