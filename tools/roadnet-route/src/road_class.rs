//! Road classification and per-class congestion parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Functional class of a link, stored on disk as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum RoadClass {
    #[default]
    None = 0,
    Motorway = 1,
    MotorwayLink = 2,
    Trunk = 3,
    TrunkLink = 4,
    Primary = 5,
    PrimaryLink = 6,
    Secondary = 7,
    SecondaryLink = 8,
    Tertiary = 9,
    TertiaryLink = 10,
    Residential = 11,
    Unclassified = 12,
}

impl RoadClass {
    pub const ALL: [RoadClass; 13] = [
        RoadClass::None,
        RoadClass::Motorway,
        RoadClass::MotorwayLink,
        RoadClass::Trunk,
        RoadClass::TrunkLink,
        RoadClass::Primary,
        RoadClass::PrimaryLink,
        RoadClass::Secondary,
        RoadClass::SecondaryLink,
        RoadClass::Tertiary,
        RoadClass::TertiaryLink,
        RoadClass::Residential,
        RoadClass::Unclassified,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            RoadClass::None => "none",
            RoadClass::Motorway => "motorway",
            RoadClass::MotorwayLink => "motorway_link",
            RoadClass::Trunk => "trunk",
            RoadClass::TrunkLink => "trunk_link",
            RoadClass::Primary => "primary",
            RoadClass::PrimaryLink => "primary_link",
            RoadClass::Secondary => "secondary",
            RoadClass::SecondaryLink => "secondary_link",
            RoadClass::Tertiary => "tertiary",
            RoadClass::TertiaryLink => "tertiary_link",
            RoadClass::Residential => "residential",
            RoadClass::Unclassified => "unclassified",
        }
    }

    /// Capacity, BPR exponent and lane count used by the volume-delay function
    pub fn congestion(self) -> Congestion {
        let (capacity, exponent, lanes) = match self {
            RoadClass::Motorway | RoadClass::MotorwayLink => (2000.0, 6.0, 4.0),
            RoadClass::Trunk | RoadClass::TrunkLink => (2000.0, 6.0, 3.0),
            RoadClass::Primary | RoadClass::PrimaryLink => (1400.0, 4.0, 2.0),
            RoadClass::Secondary | RoadClass::SecondaryLink => (800.0, 4.0, 2.0),
            _ => (500.0, 4.0, 1.0),
        };
        Congestion {
            capacity,
            exponent,
            lanes,
        }
    }
}

impl fmt::Display for RoadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RoadClass {
    type Err = String;

    /// Accepts either the integer code or the lowercase name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i32>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown road class code {code}"));
        }
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.name() == lower)
            .ok_or_else(|| format!("unknown road class '{s}'"))
    }
}

/// Per-lane capacity, BPR exponent and number of lanes for one class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Congestion {
    pub capacity: f32,
    pub exponent: f32,
    pub lanes: f32,
}

impl Congestion {
    /// Volume-delay function: BPR below saturation, linear beyond it
    ///
    /// Negative free-flow times mark impassable links and are returned unchanged.
    pub fn travel_time(&self, freeflow: f32, volume: f32) -> f32 {
        if freeflow < 0.0 {
            return freeflow;
        }
        let ratio = volume / (self.capacity * self.lanes);
        if ratio <= 1.0 {
            freeflow * (1.0 + ratio.powf(self.exponent))
        } else {
            freeflow * (self.exponent * ratio - (self.exponent - 2.0))
        }
    }
}
