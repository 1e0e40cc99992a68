//! In-memory index of the bookings for the pinned (date, time slot).
//!
//! The index owns its buffers; callers only ever get references and
//! iterators. A reload builds the replacement maps completely before
//! swapping them in, so no read observes a half-populated index.
use crate::api::{ApiError, BookingService};
use crate::model::{Booking, BookingRecord, TimeSlot};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct BookingIndex {
    pinned: Option<(NaiveDate, TimeSlot)>,
    by_pc: HashMap<String, Booking>,
    student_to_pc: HashMap<String, String>,
    last_error: Option<String>,
}

impl BookingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pinned(&self) -> Option<(NaiveDate, TimeSlot)> {
        self.pinned
    }

    pub fn is_aligned(&self, date: NaiveDate, slot: TimeSlot) -> bool {
        self.pinned == Some((date, slot))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Replaces the contents with the backend's bookings for (date, slot).
    /// On failure the index is cleared to empty, the error is recorded and
    /// returned.
    pub async fn reload(
        &mut self,
        svc: &dyn BookingService,
        date: NaiveDate,
        slot: TimeSlot,
    ) -> Result<(), ApiError> {
        match svc.list_bookings(date, slot).await {
            Ok(records) => {
                let (by_pc, student_to_pc) = build_maps(records);
                self.pinned = Some((date, slot));
                self.by_pc = by_pc;
                self.student_to_pc = student_to_pc;
                self.last_error = None;
                debug!(%date, slot = %slot, count = self.by_pc.len(), "booking index reloaded");
                Ok(())
            }
            Err(err) => {
                self.pinned = Some((date, slot));
                self.by_pc.clear();
                self.student_to_pc.clear();
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Live-update variant of [`Self::reload`]: refetches the pinned
    /// selection but keeps the previous snapshot when the fetch fails.
    /// Returns whether the index was updated.
    pub async fn refresh(&mut self, svc: &dyn BookingService) -> bool {
        let Some((date, slot)) = self.pinned else {
            return false;
        };
        match svc.list_bookings(date, slot).await {
            Ok(records) => {
                let (by_pc, student_to_pc) = build_maps(records);
                self.by_pc = by_pc;
                self.student_to_pc = student_to_pc;
                self.last_error = None;
                true
            }
            Err(err) => {
                debug!(%err, "background booking refresh failed; keeping previous snapshot");
                false
            }
        }
    }

    pub fn find_by_pc(&self, pc_id: &str) -> Option<&Booking> {
        self.by_pc.get(pc_id)
    }

    pub fn find_by_student(&self, student_id: &str) -> Option<&Booking> {
        self.student_to_pc
            .get(student_id)
            .and_then(|pc_id| self.by_pc.get(pc_id))
    }

    pub fn count_booked_in_slot(&self) -> usize {
        self.by_pc.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Booking> {
        self.by_pc.values()
    }
}

/// Drops records without a PC reference, then enforces first-wins
/// uniqueness on both the PC and the student key.
fn build_maps(records: Vec<BookingRecord>) -> (HashMap<String, Booking>, HashMap<String, String>) {
    let mut by_pc: HashMap<String, Booking> = HashMap::new();
    let mut student_to_pc: HashMap<String, String> = HashMap::new();
    for record in records {
        let Some(booking) = record.into_booking() else {
            warn!("dropping booking record without a PC reference");
            continue;
        };
        if by_pc.contains_key(&booking.pc_id) {
            warn!(pc = %booking.pc_id, "duplicate booking for PC in slot; keeping first");
            continue;
        }
        if student_to_pc.contains_key(&booking.student_id) {
            warn!(student = %booking.student_id, "duplicate booking for student in slot; keeping first");
            continue;
        }
        student_to_pc.insert(booking.student_id.clone(), booking.pc_id.clone());
        by_pc.insert(booking.pc_id.clone(), booking);
    }
    (by_pc, student_to_pc)
}
