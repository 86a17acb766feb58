use serde::{Deserialize, Serialize};

/// Categorical brand-alignment outcome. Always derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Aligned,
    NeedsEdits,
    OffBrand,
}

impl Verdict {
    pub const ALL: [&'static str; 3] = ["aligned", "needs_edits", "off_brand"];

    /// score ≥ 80 → aligned; 50–79 → needs_edits; < 50 → off_brand
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Verdict::Aligned,
            50..=79 => Verdict::NeedsEdits,
            _ => Verdict::OffBrand,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Aligned => "aligned",
            Verdict::NeedsEdits => "needs_edits",
            Verdict::OffBrand => "off_brand",
        }
    }
}
