//! Orchestration facade over the board components. Presentation code
//! observes this; it never touches the catalog, index or selection
//! directly.
use crate::api::{BookingService, CatalogService};
use crate::bulk;
use crate::catalog::CatalogCache;
use crate::index::BookingIndex;
use crate::model::{BookingError, BulkResult, Pc, Student};
use crate::selector::{Selection, SlotScenario};
use crate::status::{project, StatusToken};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LabBoard {
    catalog_svc: Arc<dyn CatalogService>,
    booking_svc: Arc<dyn BookingService>,
    catalog: CatalogCache,
    selection: Selection,
    index: BookingIndex,
    today: NaiveDate,
    background_warned: bool,
}

impl LabBoard {
    pub fn new(catalog_svc: Arc<dyn CatalogService>, booking_svc: Arc<dyn BookingService>) -> Self {
        Self::with_today(catalog_svc, booking_svc, Local::now().date_naive())
    }

    /// Like [`Self::new`] with an explicit "today", so tests do not depend
    /// on the wall clock.
    pub fn with_today(
        catalog_svc: Arc<dyn CatalogService>,
        booking_svc: Arc<dyn BookingService>,
        today: NaiveDate,
    ) -> Self {
        Self {
            catalog_svc,
            booking_svc,
            catalog: CatalogCache::new(),
            selection: Selection::new(today),
            index: BookingIndex::new(),
            today,
            background_warned: false,
        }
    }

    /// Startup path: fetch the catalog, auto-pick a slot when none is
    /// pinned yet, then load the bookings for the selection.
    pub async fn init(&mut self) -> Result<Option<SlotScenario>, BookingError> {
        self.catalog.refresh_all(self.catalog_svc.as_ref()).await;
        let scenario = if self.selection.is_pinned() {
            None
        } else {
            let (slot, scenario) = self.selection.auto_pick_now();
            info!(slot = %slot, scenario = scenario.as_str(), "auto-picked time slot");
            Some(scenario)
        };
        self.reload().await?;
        Ok(scenario)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    pub fn index(&self) -> &BookingIndex {
        &self.index
    }

    pub async fn set_date(&mut self, input: &str) -> Result<(), BookingError> {
        self.selection.set_date(input, self.today)?;
        if self.selection.is_pinned() {
            self.reload().await?;
        }
        Ok(())
    }

    pub async fn set_time_slot(&mut self, id: &str) -> Result<(), BookingError> {
        self.selection.set_time_slot(id)?;
        self.reload().await
    }

    pub fn set_batch_filter(&mut self, batch_id: Option<String>) {
        self.selection.set_batch_filter(batch_id);
    }

    pub fn toggle_filter_by_batch(&mut self) -> bool {
        self.selection.toggle_filter_by_batch()
    }

    pub fn toggle_show_only_available(&mut self) -> bool {
        self.selection.toggle_show_only_available()
    }

    /// Recomputes the booking index for the pinned selection.
    pub async fn reload(&mut self) -> Result<(), BookingError> {
        let (date, slot) = self
            .selection
            .pinned()
            .ok_or(BookingError::SelectionIncomplete)?;
        self.index
            .reload(self.booking_svc.as_ref(), date, slot)
            .await?;
        Ok(())
    }

    /// Explicit user refresh of the catalog slices.
    pub async fn refresh_catalog(&mut self) {
        self.catalog.refresh_all(self.catalog_svc.as_ref()).await;
    }

    /// The row-by-row grid of PCs with their display tokens, honoring the
    /// show-only-available toggle.
    pub fn grid(&self) -> Vec<(u32, Vec<(Pc, StatusToken)>)> {
        let pinned = self.selection.is_pinned();
        let rows = self.catalog.list_pcs_by_row();
        rows.iter()
            .map(|(row, pcs)| {
                let cells = pcs
                    .iter()
                    .map(|pc| {
                        let token = project(pc, self.index.find_by_pc(&pc.id), pinned);
                        (pc.clone(), token)
                    })
                    .filter(|(_, token)| {
                        !self.selection.show_only_available() || *token == StatusToken::Available
                    })
                    .collect();
                (*row, cells)
            })
            .collect()
    }

    /// Students offered by the picker, honoring the batch filter toggle.
    pub fn roster(&self) -> Vec<Student> {
        let snapshot = self.catalog.snapshot();
        match (self.selection.filter_by_batch(), self.selection.batch_filter()) {
            (true, Some(batch_id)) => snapshot
                .students_in_batch(batch_id)
                .into_iter()
                .cloned()
                .collect(),
            _ => snapshot.students().to_vec(),
        }
    }

    /// Books `pc` (the clicked grid cell) for `student_id` in the pinned
    /// selection.
    pub async fn create_booking(
        &mut self,
        pc: &Pc,
        student_id: &str,
        purpose: &str,
    ) -> Result<(), BookingError> {
        let snapshot = self.catalog.snapshot();
        bulk::create_booking(
            self.booking_svc.as_ref(),
            &snapshot,
            &mut self.index,
            &self.selection,
            pc,
            student_id,
            purpose,
        )
        .await
    }

    /// Copies the bookings of `source_date` onto the selected date.
    pub async fn apply_previous_day(
        &mut self,
        source_date: NaiveDate,
    ) -> Result<BulkResult, BookingError> {
        let target_date = self.selection.date();
        bulk::apply_previous_day(
            self.booking_svc.as_ref(),
            &mut self.index,
            &self.selection,
            source_date,
            target_date,
        )
        .await
    }

    pub async fn clear_slot(&mut self) -> Result<BulkResult, BookingError> {
        bulk::clear_slot(self.booking_svc.as_ref(), &mut self.index, &self.selection).await
    }

    /// Serial handler for dispatcher invalidations: refetch the bookings
    /// for the pinned selection and the PC slice. Never raises; a failing
    /// background refresh is warned about once, then degrades to debug.
    pub async fn handle_invalidate(&mut self) {
        let updated = self.index.refresh(self.booking_svc.as_ref()).await;
        if updated {
            self.background_warned = false;
        } else if self.index.pinned().is_some() {
            if self.background_warned {
                debug!("background refresh still failing");
            } else {
                warn!("background refresh failed; board may be stale until the next update");
                self.background_warned = true;
            }
        }
        self.catalog.refresh_pcs(self.catalog_svc.as_ref()).await;
    }
}
