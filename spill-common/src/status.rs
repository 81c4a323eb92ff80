use serde::{Deserialize, Serialize};

/// Lifecycle status of a single element.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementStatus {
    NotReleased,
    #[default]
    InWater,
    OnLand,
    OffMaps,
}

impl ElementStatus {
    /// Numeric code used in CSV output and by external tools.
    pub fn code(self) -> u8 {
        match self {
            ElementStatus::NotReleased => 0,
            ElementStatus::InWater => 2,
            ElementStatus::OnLand => 3,
            ElementStatus::OffMaps => 7,
        }
    }

    /// Only elements in the water are moved by movers.
    #[inline(always)]
    pub fn is_mobile(self) -> bool { self == ElementStatus::InWater }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_floating_elements_are_mobile() {
        let all = [
            ElementStatus::NotReleased,
            ElementStatus::InWater,
            ElementStatus::OnLand,
            ElementStatus::OffMaps,
        ];
        assert_eq!(all.map(ElementStatus::code), [0, 2, 3, 7]);
        assert_eq!(all.iter().filter(|s| s.is_mobile()).count(), 1);
    }
}
