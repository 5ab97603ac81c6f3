//! Slot identifiers and their spatial positions around the canvas.
//!
//! The set of slots is fixed at compile time: eight markers, one per position
//! around the shared tablet. Slots are never created or destroyed at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SlotError;

/// Number of physical marker slots around the canvas.
pub const SLOT_COUNT: u8 = 8;

/// One of the eight fixed marker slots (0 through 7).
///
/// Serialized as a bare integer so that it can be used both as a payload field
/// (`slotId`) and as a JSON object key in reservation snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    /// Creates a slot identifier, rejecting values outside `0..SLOT_COUNT`.
    pub fn new(value: u8) -> Result<Self, SlotError> {
        if value < SLOT_COUNT {
            Ok(SlotId(value))
        } else {
            Err(SlotError::OutOfRange(value))
        }
    }

    /// Iterates over every valid slot in ascending order.
    pub fn all() -> impl Iterator<Item = SlotId> {
        (0..SLOT_COUNT).map(SlotId)
    }

    /// Gets the raw numeric value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// Gets the spatial position this slot's marker is printed at.
    pub fn position(self) -> SlotPosition {
        SlotPosition::ALL[self.0 as usize]
    }
}

impl TryFrom<u8> for SlotId {
    type Error = SlotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SlotId::new(value)
    }
}

impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> Self {
        slot.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spatial placement of a slot: four corners plus four side centers,
/// listed clockwise from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotPosition {
    TopLeft,
    TopCenter,
    TopRight,
    RightCenter,
    BottomRight,
    BottomCenter,
    BottomLeft,
    LeftCenter,
}

impl SlotPosition {
    /// Positions indexed by slot number.
    pub const ALL: [SlotPosition; SLOT_COUNT as usize] = [
        SlotPosition::TopLeft,
        SlotPosition::TopCenter,
        SlotPosition::TopRight,
        SlotPosition::RightCenter,
        SlotPosition::BottomRight,
        SlotPosition::BottomCenter,
        SlotPosition::BottomLeft,
        SlotPosition::LeftCenter,
    ];

    /// Machine label, identical to the serialized form.
    pub fn key(self) -> &'static str {
        match self {
            SlotPosition::TopLeft => "top-left",
            SlotPosition::TopCenter => "top-center",
            SlotPosition::TopRight => "top-right",
            SlotPosition::RightCenter => "right-center",
            SlotPosition::BottomRight => "bottom-right",
            SlotPosition::BottomCenter => "bottom-center",
            SlotPosition::BottomLeft => "bottom-left",
            SlotPosition::LeftCenter => "left-center",
        }
    }

    /// Human-readable label shown on the phone UI.
    pub fn label(self) -> &'static str {
        match self {
            SlotPosition::TopLeft => "Top-Left",
            SlotPosition::TopCenter => "Top-Center",
            SlotPosition::TopRight => "Top-Right",
            SlotPosition::RightCenter => "Right-Center",
            SlotPosition::BottomRight => "Bottom-Right",
            SlotPosition::BottomCenter => "Bottom-Center",
            SlotPosition::BottomLeft => "Bottom-Left",
            SlotPosition::LeftCenter => "Left-Center",
        }
    }

    /// Gets the slot whose marker sits at this position.
    pub fn slot(self) -> SlotId {
        let index = SlotPosition::ALL
            .iter()
            .position(|p| *p == self)
            .unwrap_or_default();
        SlotId(index as u8)
    }
}

impl fmt::Display for SlotPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_range() {
        assert!(SlotId::new(0).is_ok());
        assert!(SlotId::new(7).is_ok());
        assert_eq!(SlotId::new(8), Err(SlotError::OutOfRange(8)));
        assert_eq!(SlotId::all().count(), SLOT_COUNT as usize);
    }

    #[test]
    fn test_slot_positions() {
        let top_left = SlotId::new(0).unwrap();
        let left_center = SlotId::new(7).unwrap();

        assert_eq!(top_left.position(), SlotPosition::TopLeft);
        assert_eq!(left_center.position().label(), "Left-Center");
        assert_eq!(SlotPosition::RightCenter.slot().value(), 3);

        for slot in SlotId::all() {
            assert_eq!(slot.position().slot(), slot);
        }
    }

    #[test]
    fn test_slot_serialization() {
        let slot = SlotId::new(5).unwrap();
        assert_eq!(serde_json::to_string(&slot).unwrap(), "5");
        assert_eq!(serde_json::from_str::<SlotId>("5").unwrap(), slot);
        assert!(serde_json::from_str::<SlotId>("12").is_err());

        let position = serde_json::to_string(&SlotPosition::BottomCenter).unwrap();
        assert_eq!(position, "\"bottom-center\"");
    }
}
