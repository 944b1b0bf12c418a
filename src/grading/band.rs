use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Coarse outcome bucket. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GradeBand {
    Unclassified,
    Level1,
    Level2,
    Level3,
    Level4,
    Level5,
}

/// Minimum score every dimension must reach for each band, best first.
const BAND_FLOORS: &[(f64, GradeBand)] = &[
    (5.5, GradeBand::Level5),
    (4.0, GradeBand::Level4),
    (2.5, GradeBand::Level3),
    (1.0, GradeBand::Level2),
];

impl GradeBand {
    pub fn label(self) -> &'static str {
        match self {
            GradeBand::Unclassified => "Unclassified",
            GradeBand::Level1 => "LEVEL 1",
            GradeBand::Level2 => "LEVEL 2",
            GradeBand::Level3 => "LEVEL 3",
            GradeBand::Level4 => "LEVEL 4",
            GradeBand::Level5 => "LEVEL 5",
        }
    }

    /// Accept "Unclassified" or a "LEVEL n" label with n in 1..=5.
    /// Anything else is not a legal band.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("unclassified") {
            return Some(GradeBand::Unclassified);
        }
        let prefix = label.get(..5)?;
        if !prefix.eq_ignore_ascii_case("level") {
            return None;
        }
        match label[5..].trim().parse::<u8>().ok()? {
            1 => Some(GradeBand::Level1),
            2 => Some(GradeBand::Level2),
            3 => Some(GradeBand::Level3),
            4 => Some(GradeBand::Level4),
            5 => Some(GradeBand::Level5),
            _ => None,
        }
    }

    /// Deterministic band from three clamped scores. Conjunctive: the
    /// weakest dimension decides.
    pub fn infer(content: f64, language: f64, organization: f64) -> Self {
        if content == 0.0 && language == 0.0 && organization == 0.0 {
            return GradeBand::Unclassified;
        }
        let weakest = content.min(language).min(organization);
        BAND_FLOORS
            .iter()
            .find(|(floor, _)| weakest >= *floor)
            .map(|(_, band)| *band)
            .unwrap_or(GradeBand::Level1)
    }
}

impl fmt::Display for GradeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for GradeBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for GradeBand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        GradeBand::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown grade band '{}'", label)))
    }
}
