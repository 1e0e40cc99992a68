//! Pure projection of a PC cell to its display status token.
use crate::model::{AttendanceStatus, Booking, Pc, PcStatus};

/// The display alphabet for a PC cell. The `Unselected*` tokens mirror the
/// console's color map; the projection rules below only ever emit
/// `UnselectedActive`, since a PC's own status outranks the pin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusToken {
    Available,
    Pending,
    Present,
    Absent,
    Late,
    Maintenance,
    Inactive,
    UnselectedActive,
    UnselectedMaintenance,
    UnselectedInactive,
}

impl StatusToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusToken::Available => "available",
            StatusToken::Pending => "pending",
            StatusToken::Present => "present",
            StatusToken::Absent => "absent",
            StatusToken::Late => "late",
            StatusToken::Maintenance => "maintenance",
            StatusToken::Inactive => "inactive",
            StatusToken::UnselectedActive => "unselected-active",
            StatusToken::UnselectedMaintenance => "unselected-maintenance",
            StatusToken::UnselectedInactive => "unselected-inactive",
        }
    }
}

/// Maps (PC, booking?) to a status token; top match wins.
///
/// PC status outranks booking information: a maintenance PC that somehow
/// carries a booking still displays as maintenance.
pub fn project(pc: &Pc, booking: Option<&Booking>, selection_pinned: bool) -> StatusToken {
    match pc.status {
        PcStatus::Inactive => return StatusToken::Inactive,
        PcStatus::Maintenance => return StatusToken::Maintenance,
        PcStatus::Active => {}
    }
    if !selection_pinned {
        return StatusToken::UnselectedActive;
    }
    match booking {
        Some(b) => match b.attendance_status {
            AttendanceStatus::Present => StatusToken::Present,
            AttendanceStatus::Absent => StatusToken::Absent,
            AttendanceStatus::Late => StatusToken::Late,
            AttendanceStatus::NotMarked => StatusToken::Pending,
        },
        None => StatusToken::Available,
    }
}
