//! Core identifier and tag types
//!
//! Record types carry stable snake_case string tags because ingestion
//! requests arrive as strings from the outer API layer; an unrecognized
//! tag is a client error, not a panic.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Mints a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semester partition key.
///
/// Semester boundaries are defined by the caller (e.g. "2025 Fall");
/// the engine treats the value as an opaque partition and never derives
/// it from the clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Semester(String);

impl Semester {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Semester {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Where a demerit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Dorm,
    Teaching,
    Electronics,
    Other,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dorm => "dorm",
            Self::Teaching => "teaching",
            Self::Electronics => "electronics",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every record type the engine accepts at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Late for morning roll call
    Tardy,
    /// Left the dorm room after curfew
    LeaveRoomLate,
    /// Did not return to school as scheduled
    LateSchoolReturn,
    /// Entered a meeting or reception room without permission
    MeetingRoomIntrusion,
    /// Dorm warning; minted by the trash chain, also directly recordable
    DormWarning,
    /// Dorm trash not emptied
    DormTrash,
    /// Teaching demerit ticket
    TeachingDemeritTicket,
    /// Dorm praise (positive)
    DormPraise,
    /// Teaching reward ticket (positive)
    TeachingRewardTicket,
    /// Electronics violation during online class; direct demerit
    ElectronicsViolation,
    /// Phone returned after 22:00; direct demerit
    LatePhoneReturn,
    /// Phone returned between 21:30 and 22:00; plain record, no derivation
    PhoneLateMinor,
    /// Explicitly recorded demerit
    Demerit,
    /// Explicitly recorded reward credit
    Reward,
}

impl RecordType {
    /// Stable wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tardy => "tardy",
            Self::LeaveRoomLate => "leave_room_late",
            Self::LateSchoolReturn => "late_school_return",
            Self::MeetingRoomIntrusion => "meeting_room_intrusion",
            Self::DormWarning => "dorm_warning",
            Self::DormTrash => "dorm_trash",
            Self::TeachingDemeritTicket => "teaching_demerit_ticket",
            Self::DormPraise => "dorm_praise",
            Self::TeachingRewardTicket => "teaching_reward_ticket",
            Self::ElectronicsViolation => "electronics_violation",
            Self::LatePhoneReturn => "late_phone_return",
            Self::PhoneLateMinor => "phone_late_minor",
            Self::Demerit => "demerit",
            Self::Reward => "reward",
        }
    }

    /// Parses a wire tag. Returns None for unknown tags.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "tardy" => Some(Self::Tardy),
            "leave_room_late" => Some(Self::LeaveRoomLate),
            "late_school_return" => Some(Self::LateSchoolReturn),
            "meeting_room_intrusion" => Some(Self::MeetingRoomIntrusion),
            "dorm_warning" => Some(Self::DormWarning),
            "dorm_trash" => Some(Self::DormTrash),
            "teaching_demerit_ticket" => Some(Self::TeachingDemeritTicket),
            "dorm_praise" => Some(Self::DormPraise),
            "teaching_reward_ticket" => Some(Self::TeachingRewardTicket),
            "electronics_violation" => Some(Self::ElectronicsViolation),
            "late_phone_return" => Some(Self::LatePhoneReturn),
            "phone_late_minor" => Some(Self::PhoneLateMinor),
            "demerit" => Some(Self::Demerit),
            "reward" => Some(Self::Reward),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
