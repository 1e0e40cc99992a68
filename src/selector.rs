//! Slot selector: the (date, time slot, batch filter) the board is pinned to.
use crate::model::{BookingError, TimeSlot};
use chrono::{Local, NaiveDate, Timelike};

/// Which branch of the auto-pick rule fired. Observable for UI feedback
/// only; it does not change later behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotScenario {
    Active,
    AfterHours,
    BeforeHours,
    Fallback,
}

impl SlotScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotScenario::Active => "active",
            SlotScenario::AfterHours => "after-hours",
            SlotScenario::BeforeHours => "before-hours",
            SlotScenario::Fallback => "fallback",
        }
    }
}

/// Deterministic slot choice from a local wall-clock minute-of-day.
///
/// In order: a slot whose `[start, end)` window contains the minute; past
/// the last slot's end; before the first slot's start; otherwise (the
/// midday gap) the first slot.
pub fn auto_pick_slot(minute_of_day: u32) -> (TimeSlot, SlotScenario) {
    for slot in TimeSlot::ALL {
        if minute_of_day >= slot.start_minute() && minute_of_day < slot.end_minute() {
            return (slot, SlotScenario::Active);
        }
    }
    if minute_of_day >= TimeSlot::last().end_minute() {
        return (TimeSlot::last(), SlotScenario::AfterHours);
    }
    if minute_of_day < TimeSlot::first().start_minute() {
        return (TimeSlot::first(), SlotScenario::BeforeHours);
    }
    (TimeSlot::first(), SlotScenario::Fallback)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    date: NaiveDate,
    time_slot: Option<TimeSlot>,
    batch_filter: Option<String>,
    filter_by_batch: bool,
    show_only_available: bool,
}

impl Selection {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            time_slot: None,
            batch_filter: None,
            filter_by_batch: false,
            show_only_available: false,
        }
    }

    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time_slot(&self) -> Option<TimeSlot> {
        self.time_slot
    }

    pub fn batch_filter(&self) -> Option<&str> {
        self.batch_filter.as_deref()
    }

    pub fn filter_by_batch(&self) -> bool {
        self.filter_by_batch
    }

    pub fn show_only_available(&self) -> bool {
        self.show_only_available
    }

    /// Both halves of the pin, when set.
    pub fn pinned(&self) -> Option<(NaiveDate, TimeSlot)> {
        self.time_slot.map(|slot| (self.date, slot))
    }

    pub fn is_pinned(&self) -> bool {
        self.time_slot.is_some()
    }

    /// Sets the board date from an ISO `YYYY-MM-DD` string. Dates before
    /// `today` are refused here; apply-previous reads its source date
    /// directly and is not bound by this.
    pub fn set_date(&mut self, input: &str, today: NaiveDate) -> Result<(), BookingError> {
        let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .map_err(|_| BookingError::InvalidDate(input.to_string()))?;
        if date < today {
            return Err(BookingError::DateInPast(date));
        }
        self.date = date;
        Ok(())
    }

    pub fn set_time_slot(&mut self, id: &str) -> Result<TimeSlot, BookingError> {
        let slot: TimeSlot = id.parse()?;
        self.time_slot = Some(slot);
        Ok(slot)
    }

    pub fn set_slot(&mut self, slot: TimeSlot) {
        self.time_slot = Some(slot);
    }

    /// Picks and pins a slot from the wall-clock minute. Idempotent for a
    /// fixed minute.
    pub fn auto_pick(&mut self, minute_of_day: u32) -> (TimeSlot, SlotScenario) {
        let (slot, scenario) = auto_pick_slot(minute_of_day);
        self.time_slot = Some(slot);
        (slot, scenario)
    }

    /// `auto_pick` against the local clock, for module init.
    pub fn auto_pick_now(&mut self) -> (TimeSlot, SlotScenario) {
        let now = Local::now();
        self.auto_pick(now.hour() * 60 + now.minute())
    }

    pub fn set_batch_filter(&mut self, batch_id: Option<String>) {
        self.batch_filter = batch_id;
    }

    pub fn toggle_filter_by_batch(&mut self) -> bool {
        self.filter_by_batch = !self.filter_by_batch;
        self.filter_by_batch
    }

    pub fn toggle_show_only_available(&mut self) -> bool {
        self.show_only_available = !self.show_only_available;
        self.show_only_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute(h: u32, m: u32) -> u32 {
        h * 60 + m
    }

    #[test]
    fn picks_active_slot_mid_window() {
        let (slot, scenario) = auto_pick_slot(minute(10, 45));
        assert_eq!(slot, TimeSlot::LateMorning);
        assert_eq!(scenario, SlotScenario::Active);
    }

    #[test]
    fn picks_last_slot_after_hours() {
        let (slot, scenario) = auto_pick_slot(minute(17, 30));
        assert_eq!(slot, TimeSlot::Evening);
        assert_eq!(scenario, SlotScenario::AfterHours);
    }

    #[test]
    fn picks_first_slot_before_hours() {
        let (slot, scenario) = auto_pick_slot(minute(7, 0));
        assert_eq!(slot, TimeSlot::EarlyMorning);
        assert_eq!(scenario, SlotScenario::BeforeHours);
    }

    #[test]
    fn midday_gap_falls_back_to_first_slot() {
        let (slot, scenario) = auto_pick_slot(minute(13, 45));
        assert_eq!(slot, TimeSlot::EarlyMorning);
        assert_eq!(scenario, SlotScenario::Fallback);
    }

    #[test]
    fn slot_start_is_inclusive() {
        let (slot, scenario) = auto_pick_slot(minute(9, 0));
        assert_eq!(slot, TimeSlot::EarlyMorning);
        assert_eq!(scenario, SlotScenario::Active);
    }

    #[test]
    fn slot_end_rolls_into_next_slot() {
        // 10:30 is the end of the first slot and the start of the second.
        let (slot, _) = auto_pick_slot(minute(10, 30));
        assert_eq!(slot, TimeSlot::LateMorning);
        // 17:00 is the end of the last slot; after-hours keeps it pinned.
        let (slot, scenario) = auto_pick_slot(minute(17, 0));
        assert_eq!(slot, TimeSlot::Evening);
        assert_eq!(scenario, SlotScenario::AfterHours);
    }

    #[test]
    fn auto_pick_is_idempotent_per_minute() {
        for m in [0, minute(9, 0), minute(13, 45), minute(23, 59)] {
            assert_eq!(auto_pick_slot(m), auto_pick_slot(m));
        }
    }

    #[test]
    fn set_date_validates_iso_and_past() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut sel = Selection::new(today);

        assert!(matches!(
            sel.set_date("06/02/2025", today),
            Err(BookingError::InvalidDate(_))
        ));
        assert!(matches!(
            sel.set_date("2025-05-31", today),
            Err(BookingError::DateInPast(_))
        ));
        sel.set_date("2025-06-02", today).unwrap();
        assert_eq!(sel.date(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }

    #[test]
    fn set_time_slot_rejects_unknown_ids() {
        let mut sel = Selection::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(sel.set_time_slot("10:30 AM - 12:00 PM").is_ok());
        assert!(matches!(
            sel.set_time_slot("midnight"),
            Err(BookingError::InvalidTimeSlot(_))
        ));
        // the failed set keeps the previous pin
        assert_eq!(sel.time_slot(), Some(TimeSlot::LateMorning));
    }

    #[test]
    fn pinned_requires_slot() {
        let mut sel = Selection::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(sel.pinned().is_none());
        sel.set_slot(TimeSlot::EarlyMorning);
        assert_eq!(
            sel.pinned(),
            Some((sel.date(), TimeSlot::EarlyMorning))
        );
    }

    #[test]
    fn toggles_flip_state() {
        let mut sel = Selection::new(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(sel.toggle_filter_by_batch());
        assert!(!sel.toggle_filter_by_batch());
        assert!(sel.toggle_show_only_available());
        sel.set_batch_filter(Some("b1".into()));
        assert_eq!(sel.batch_filter(), Some("b1"));
    }
}
