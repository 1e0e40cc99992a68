//! Domain value objects for the lab booking board.
use crate::api::ApiError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("PC {0} is not bookable in its current status")]
    PcNotBookable(String),
    #[error("PC {0} already has a booking for this date and slot")]
    PcSlotOccupied(String),
    #[error("student {0} already has a booking for this date and slot")]
    StudentDoubleBooked(String),
    #[error("student {0} is not in the catalog")]
    UnknownStudent(String),
    #[error("both a date and a time slot must be selected")]
    SelectionIncomplete,
    #[error("unrecognized time slot: {0:?}")]
    InvalidTimeSlot(String),
    #[error("not a valid ISO date: {0:?}")]
    InvalidDate(String),
    #[error("date {0} is in the past")]
    DateInPast(NaiveDate),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PcStatus {
    Active,
    Maintenance,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pc {
    pub id: String,
    pub pc_number: u32,
    pub row_number: u32,
    pub status: PcStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchTiming {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "teacher")]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub timing: Option<BatchTiming>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Teacher {
    pub id: String,
    pub name: String,
}

/// The backend sends `student.batch` either as the full batch object or as
/// a bare id. Callers resolve it through `CatalogSnapshot::resolve_student`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BatchRef {
    Inline(Batch),
    Id(String),
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub batch: BatchRef,
    #[serde(default, rename = "teacher")]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

/// Period of the day a slot belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Afternoon,
    Evening,
}

/// The five lab slots. The serde rename is the wire-level identifier the
/// backend expects; labels, ordering and period tags all derive from here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeSlot {
    #[serde(rename = "09:00 AM - 10:30 AM")]
    EarlyMorning,
    #[serde(rename = "10:30 AM - 12:00 PM")]
    LateMorning,
    #[serde(rename = "12:00 PM - 01:30 PM")]
    EarlyAfternoon,
    #[serde(rename = "02:00 PM - 03:30 PM")]
    LateAfternoon,
    #[serde(rename = "03:30 PM - 05:00 PM")]
    Evening,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 5] = [
        TimeSlot::EarlyMorning,
        TimeSlot::LateMorning,
        TimeSlot::EarlyAfternoon,
        TimeSlot::LateAfternoon,
        TimeSlot::Evening,
    ];

    pub fn wire_label(&self) -> &'static str {
        match self {
            TimeSlot::EarlyMorning => "09:00 AM - 10:30 AM",
            TimeSlot::LateMorning => "10:30 AM - 12:00 PM",
            TimeSlot::EarlyAfternoon => "12:00 PM - 01:30 PM",
            TimeSlot::LateAfternoon => "02:00 PM - 03:30 PM",
            TimeSlot::Evening => "03:30 PM - 05:00 PM",
        }
    }

    /// Slot start as minute-of-day (24h clock).
    pub fn start_minute(&self) -> u32 {
        match self {
            TimeSlot::EarlyMorning => 9 * 60,
            TimeSlot::LateMorning => 10 * 60 + 30,
            TimeSlot::EarlyAfternoon => 12 * 60,
            TimeSlot::LateAfternoon => 14 * 60,
            TimeSlot::Evening => 15 * 60 + 30,
        }
    }

    /// Slot end as minute-of-day (exclusive).
    pub fn end_minute(&self) -> u32 {
        match self {
            TimeSlot::EarlyMorning => 10 * 60 + 30,
            TimeSlot::LateMorning => 12 * 60,
            TimeSlot::EarlyAfternoon => 13 * 60 + 30,
            TimeSlot::LateAfternoon => 15 * 60 + 30,
            TimeSlot::Evening => 17 * 60,
        }
    }

    pub fn period(&self) -> Period {
        match self {
            TimeSlot::EarlyMorning | TimeSlot::LateMorning => Period::Morning,
            TimeSlot::EarlyAfternoon | TimeSlot::LateAfternoon => Period::Afternoon,
            TimeSlot::Evening => Period::Evening,
        }
    }

    pub fn first() -> TimeSlot {
        TimeSlot::ALL[0]
    }

    pub fn last() -> TimeSlot {
        TimeSlot::ALL[TimeSlot::ALL.len() - 1]
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_label())
    }
}

impl FromStr for TimeSlot {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeSlot::ALL
            .iter()
            .copied()
            .find(|slot| slot.wire_label() == s)
            .ok_or_else(|| BookingError::InvalidTimeSlot(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    #[default]
    NotMarked,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::NotMarked => "not-marked",
        }
    }
}

/// A booking as the index stores it: always carries a PC reference and a
/// concrete attendance status. Serializes under the same keys the backend
/// sends (`pc`, `student`, `batch`), so a fetched booking can be re-sent
/// to the bulk endpoints unchanged.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    #[serde(rename = "pc")]
    pub pc_id: String,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    #[serde(rename = "student")]
    pub student_id: String,
    pub student_name: String,
    pub teacher_name: String,
    #[serde(rename = "batch")]
    pub batch_id: Option<String>,
    pub purpose: String,
    pub attendance_status: AttendanceStatus,
}

/// A booking as the backend sends it. The PC reference can be absent and
/// attendance may be unmarked; `into_booking` normalizes both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: String,
    #[serde(default, rename = "pc")]
    pub pc_id: Option<String>,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    #[serde(rename = "student")]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default, rename = "batch")]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub attendance_status: Option<AttendanceStatus>,
}

impl BookingRecord {
    /// Returns `None` when the record has no PC reference.
    pub fn into_booking(self) -> Option<Booking> {
        let pc_id = self.pc_id?;
        Some(Booking {
            id: self.id,
            pc_id,
            date: self.date,
            time_slot: self.time_slot,
            student_id: self.student_id,
            student_name: self.student_name,
            teacher_name: self.teacher_name,
            batch_id: self.batch_id,
            purpose: self.purpose,
            attendance_status: self.attendance_status.unwrap_or_default(),
        })
    }
}

/// Payload for creating one booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub pc: String,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub student: String,
    pub student_name: String,
    pub teacher_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    pub purpose: String,
}

/// Outcome of a bulk workflow. `conflicts` holds one entry per item skipped
/// because the target already had a booking on the same (date, slot, pc).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub conflicts: Vec<String>,
}
