//! Bulk workflows: apply-previous-day, clear-slot and single booking
//! creation. Each runs its items sequentially so the surfaced counts are
//! meaningful, and each ends by reloading the booking index.
use crate::api::{ApplyPreviousResponse, BookingService, ClearBulkResponse};
use crate::catalog::CatalogSnapshot;
use crate::index::BookingIndex;
use crate::model::{Booking, BookingError, BulkResult, NewBooking, Pc, PcStatus, TimeSlot};
use crate::selector::Selection;
use chrono::NaiveDate;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Creates one booking for the pinned selection after the local
/// precondition checks. The checks run in a fixed order and never issue a
/// network call when one fails.
#[instrument(skip_all, fields(pc = %pc.id, student = student_id))]
pub async fn create_booking(
    svc: &dyn BookingService,
    catalog: &CatalogSnapshot,
    index: &mut BookingIndex,
    selection: &Selection,
    pc: &Pc,
    student_id: &str,
    purpose: &str,
) -> Result<(), BookingError> {
    let (date, slot) = selection.pinned().ok_or(BookingError::SelectionIncomplete)?;

    // the cached slice may be fresher than the clicked cell
    let status = catalog
        .find_pc(&pc.id)
        .map(|cached| cached.status)
        .unwrap_or(pc.status);
    if status != PcStatus::Active {
        return Err(BookingError::PcNotBookable(pc.id.clone()));
    }
    if index.find_by_pc(&pc.id).is_some() {
        return Err(BookingError::PcSlotOccupied(pc.id.clone()));
    }
    if index.find_by_student(student_id).is_some() {
        return Err(BookingError::StudentDoubleBooked(student_id.to_string()));
    }
    let ctx = catalog.resolve_student(student_id)?;

    let payload = NewBooking {
        pc: pc.id.clone(),
        date,
        time_slot: slot,
        student: ctx.student.id.clone(),
        student_name: ctx.student.name.clone(),
        teacher_name: ctx.teacher.map(|t| t.name).unwrap_or_default(),
        batch: ctx.batch.map(|b| b.id),
        purpose: purpose.to_string(),
    };
    svc.create_booking(&payload).await.map_err(BookingError::Api)?;
    index.reload(svc, date, slot).await?;
    info!(pc = %pc.id, student = student_id, "booking created");
    Ok(())
}

/// Copies every booking of `source_date` (all five slots) onto
/// `target_date`. The server-side bulk endpoint is preferred; when it is
/// missing or fails, items are created one by one with local collision
/// checks, counting collisions as conflicts rather than failures.
#[instrument(skip_all, fields(%source_date, %target_date))]
pub async fn apply_previous_day(
    svc: &dyn BookingService,
    index: &mut BookingIndex,
    selection: &Selection,
    source_date: NaiveDate,
    target_date: NaiveDate,
) -> Result<BulkResult, BookingError> {
    let mut source = Vec::new();
    for slot in TimeSlot::ALL {
        let records = svc
            .list_bookings(source_date, slot)
            .await
            .map_err(BookingError::Api)?;
        source.extend(records.into_iter().filter_map(|r| r.into_booking()));
    }

    let result = match svc.apply_previous(target_date, &source).await {
        Ok(res) => result_from_apply_response(&res),
        Err(err) => {
            warn!(%err, "bulk apply endpoint unusable; falling back to per-booking creation");
            apply_one_by_one(svc, index, target_date, &source).await
        }
    };

    reload_for_selection(svc, index, selection).await;
    info!(
        attempted = result.attempted,
        succeeded = result.succeeded,
        failed = result.failed,
        conflicts = result.conflicts.len(),
        "apply-previous finished"
    );
    Ok(result)
}

fn result_from_apply_response(res: &ApplyPreviousResponse) -> BulkResult {
    for error in &res.errors {
        warn!(%error, "server reported apply-previous item error");
    }
    BulkResult {
        attempted: res.applied_count + res.errors.len(),
        succeeded: res.applied_count,
        failed: res.errors.len(),
        conflicts: Vec::new(),
    }
}

/// Sequential fallback. Collision checks consult the index when it is
/// already pinned to the target slot, and otherwise point-probe the
/// backend once per slot for the duration of the operation.
async fn apply_one_by_one(
    svc: &dyn BookingService,
    index: &BookingIndex,
    target_date: NaiveDate,
    source: &[Booking],
) -> BulkResult {
    let mut result = BulkResult::default();
    let mut taken: HashMap<TimeSlot, HashSet<String>> = HashMap::new();

    for booking in source {
        result.attempted += 1;
        let slot = booking.time_slot;

        let occupied = match taken.entry(slot) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let seeded = if index.is_aligned(target_date, slot) {
                    Ok(index.all().map(|b| b.pc_id.clone()).collect())
                } else {
                    probe_slot(svc, target_date, slot).await
                };
                match seeded {
                    Ok(pcs) => entry.insert(pcs),
                    Err(err) => {
                        warn!(%err, slot = %slot, "collision probe failed; skipping item");
                        result.failed += 1;
                        continue;
                    }
                }
            }
        };

        if occupied.contains(&booking.pc_id) {
            result
                .conflicts
                .push(format!("{} @ {}", booking.pc_id, slot));
            continue;
        }

        let payload = NewBooking {
            pc: booking.pc_id.clone(),
            date: target_date,
            time_slot: slot,
            student: booking.student_id.clone(),
            student_name: booking.student_name.clone(),
            teacher_name: booking.teacher_name.clone(),
            batch: booking.batch_id.clone(),
            purpose: booking.purpose.clone(),
        };
        match svc.create_booking(&payload).await {
            Ok(_) => {
                occupied.insert(booking.pc_id.clone());
                result.succeeded += 1;
            }
            Err(err) => {
                warn!(%err, pc = %booking.pc_id, "per-booking create failed");
                result.failed += 1;
            }
        }
    }
    result
}

async fn probe_slot(
    svc: &dyn BookingService,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<HashSet<String>, crate::api::ApiError> {
    let records = svc.list_bookings(date, slot).await?;
    Ok(records
        .into_iter()
        .filter_map(|r| r.into_booking())
        .map(|b| b.pc_id)
        .collect())
}

/// Deletes every booking in the selected (date, slot). Prefers the
/// server-side bulk endpoint, falling back to per-booking deletion against
/// the index contents.
#[instrument(skip_all)]
pub async fn clear_slot(
    svc: &dyn BookingService,
    index: &mut BookingIndex,
    selection: &Selection,
) -> Result<BulkResult, BookingError> {
    let (date, slot) = selection.pinned().ok_or(BookingError::SelectionIncomplete)?;

    let result = match svc.clear_bulk(date, &[slot]).await {
        Ok(res) => result_from_clear_response(&res),
        Err(err) => {
            warn!(%err, "bulk clear endpoint unusable; falling back to per-booking deletion");
            if !index.is_aligned(date, slot) {
                index.reload(svc, date, slot).await?;
            }
            let ids: Vec<String> = index.all().map(|b| b.id.clone()).collect();
            let mut result = BulkResult {
                attempted: ids.len(),
                ..BulkResult::default()
            };
            for id in ids {
                match svc.delete_booking(&id).await {
                    Ok(()) => result.succeeded += 1,
                    Err(err) => {
                        warn!(%err, booking = %id, "per-booking delete failed");
                        result.failed += 1;
                    }
                }
            }
            result
        }
    };

    reload_for_selection(svc, index, selection).await;
    info!(
        attempted = result.attempted,
        succeeded = result.succeeded,
        failed = result.failed,
        "clear-slot finished"
    );
    Ok(result)
}

fn result_from_clear_response(res: &ClearBulkResponse) -> BulkResult {
    if let Some(message) = &res.message {
        info!(%message, "bulk clear");
    }
    BulkResult {
        attempted: res.deleted_count,
        succeeded: res.deleted_count,
        failed: 0,
        conflicts: Vec::new(),
    }
}

/// Post-workflow reload of the index for the user's current selection. The
/// bulk result has already been computed, so a failure here is only
/// warned about; the index records its own last error.
async fn reload_for_selection(
    svc: &dyn BookingService,
    index: &mut BookingIndex,
    selection: &Selection,
) {
    if let Some((date, slot)) = selection.pinned() {
        if let Err(err) = index.reload(svc, date, slot).await {
            warn!(%err, "post-bulk index reload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_apply_response_maps_to_bulk_result() {
        let res = ApplyPreviousResponse {
            applied_count: 5,
            message: None,
            errors: vec!["pc p3 unavailable".into()],
        };
        let result = result_from_apply_response(&res);
        assert_eq!(result.attempted, 6);
        assert_eq!(result.succeeded, 5);
        assert_eq!(result.failed, 1);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn server_clear_response_maps_to_bulk_result() {
        let res = ClearBulkResponse {
            deleted_count: 3,
            message: Some("cleared".into()),
        };
        let result = result_from_clear_response(&res);
        assert_eq!(result.attempted, 3);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 0);
    }
}
