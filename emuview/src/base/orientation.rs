use serde::{Deserialize, Serialize};

/// Content rotation applied to a window.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Orientation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Fallback priority when the active orientation becomes invalid.
    pub const PRIORITY: [Orientation; 4] = [
        Orientation::Rotate0,
        Orientation::Rotate90,
        Orientation::Rotate180,
        Orientation::Rotate270,
    ];

    pub fn is_sideways(self) -> bool {
        matches!(self, Orientation::Rotate90 | Orientation::Rotate270)
    }

    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Rotate0 => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    /// Panics on anything outside the four right angles.
    pub fn from_degrees(degrees: u32) -> Self {
        match degrees {
            0 => Orientation::Rotate0,
            90 => Orientation::Rotate90,
            180 => Orientation::Rotate180,
            270 => Orientation::Rotate270,
            _ => unreachable!("invalid orientation: {} degrees", degrees),
        }
    }

    fn bit(self) -> u8 {
        match self {
            Orientation::Rotate0 => 1 << 0,
            Orientation::Rotate90 => 1 << 1,
            Orientation::Rotate180 => 1 << 2,
            Orientation::Rotate270 => 1 << 3,
        }
    }
}

/// Set of permitted orientations.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct OrientationMask(u8);

impl OrientationMask {
    pub const NONE: Self = Self(0);
    pub const PORTRAIT: Self = Self(0b0101);
    pub const LANDSCAPE: Self = Self(0b1010);
    pub const ALL: Self = Self(0b1111);

    pub fn only(orientation: Orientation) -> Self {
        Self(orientation.bit())
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, orientation: Orientation) -> bool {
        self.0 & orientation.bit() != 0
    }

    pub fn with(self, orientation: Orientation) -> Self {
        Self(self.0 | orientation.bit())
    }

    pub fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// First member in [`Orientation::PRIORITY`] order.
    pub fn first(self) -> Option<Orientation> {
        Orientation::PRIORITY
            .into_iter()
            .find(|orientation| self.contains(*orientation))
    }
}
