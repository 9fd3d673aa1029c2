//! Slot reflow.
//!
//! Lays out every reservation that belongs to one slot back to back from the
//! slot's base time, so that items sharing a slot never overlap on the
//! calendar. Membership is decided by the slot tag stamped on each event
//! (strict match) plus untagged events whose start lies inside the slot
//! window (window match).

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::{
    domain::{EventId, RenderSurface, SlotConfig, SlotKey, SurfaceEvent},
    error::{PlacementError, SlotError},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReflowOptions {
    /// Only lay out events already tagged with the slot. Used for the slot an
    /// event just left, so nothing new is pulled in.
    pub strict_only: bool,
}

impl ReflowOptions {
    pub fn strict_only() -> Self {
        Self { strict_only: true }
    }
}

/// What a reflow did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflowReport {
    pub slot: SlotKey,
    /// Events placed, in layout order
    pub placed: Vec<EventId>,
    /// Untagged events that were adopted into the slot
    pub migrated: Vec<EventId>,
    /// Events the surface refused to move
    pub failed: Vec<EventId>,
    /// Per-item duration used for this layout
    pub duration_minutes: u32,
}

impl ReflowReport {
    fn empty(slot: SlotKey) -> Self {
        Self {
            slot,
            placed: Vec::new(),
            migrated: Vec::new(),
            failed: Vec::new(),
            duration_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReflowEngine {
    config: SlotConfig,
}

impl ReflowEngine {
    pub fn new(config: SlotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Slot an event currently belongs to: its tag, or the slot its start falls in
    pub fn slot_of(&self, event: &SurfaceEvent) -> Option<SlotKey> {
        event
            .slot_tag
            .or_else(|| self.config.slot_key_for(event.start).ok())
    }

    /// Reflow the slot containing `raw_time` on `date`
    pub fn reflow_slot(
        &self,
        surface: &mut dyn RenderSurface,
        date: NaiveDate,
        raw_time: &str,
        options: ReflowOptions,
    ) -> Result<ReflowReport, SlotError> {
        let key = self.config.slot_key(date, raw_time)?;
        Ok(self.reflow_key(surface, key, options))
    }

    /// Reflow an already computed slot
    pub fn reflow_key(
        &self,
        surface: &mut dyn RenderSurface,
        key: SlotKey,
        options: ReflowOptions,
    ) -> ReflowReport {
        let migrated = if options.strict_only {
            Vec::new()
        } else {
            self.reconcile_tags(surface, &key)
        };
        let mut report = self.assign_placements(surface, &key, options);
        report.migrated = migrated;
        report
    }

    /// Stamp the slot tag on untagged schedulable events inside the slot window.
    ///
    /// Returns the ids that were stamped. Running it twice stamps nothing the
    /// second time.
    pub fn reconcile_tags(&self, surface: &mut dyn RenderSurface, key: &SlotKey) -> Vec<EventId> {
        let candidates: Vec<EventId> = surface
            .events()
            .into_iter()
            .filter(|event| self.is_window_match(event, key))
            .map(|event| event.id)
            .collect();

        let mut stamped = Vec::with_capacity(candidates.len());
        for id in candidates {
            match surface.set_slot_tag(&id, Some(*key)) {
                Ok(()) => stamped.push(id),
                Err(e) => tracing::warn!("Could not tag '{}' with slot {}: {}", id, key, e),
            }
        }
        stamped
    }

    /// Place the members of a slot one after another from the slot base
    pub fn assign_placements(
        &self,
        surface: &mut dyn RenderSurface,
        key: &SlotKey,
        options: ReflowOptions,
    ) -> ReflowReport {
        let mut seen = HashSet::new();
        let mut members: Vec<SurfaceEvent> = surface
            .events()
            .into_iter()
            .filter(|event| event.is_schedulable())
            .filter(|event| {
                event.slot_tag.as_ref() == Some(key)
                    || (!options.strict_only && self.is_window_match(event, key))
            })
            .filter(|event| seen.insert(event.id.clone()))
            .collect();

        if members.is_empty() {
            return ReflowReport::empty(*key);
        }

        members.sort_by(|a, b| {
            a.appointment_type
                .cmp(&b.appointment_type)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });

        let duration = self.config.duration_for(members.len());
        let step = TimeDelta::minutes(i64::from(duration + self.config.gap_minutes));
        let length = TimeDelta::minutes(i64::from(duration));

        let mut report = ReflowReport::empty(*key);
        report.duration_minutes = duration;
        let mut start = key.starts_at();
        for event in members {
            match place_one(surface, &event.id, key, start, start + length) {
                Ok(()) => report.placed.push(event.id),
                Err(e) => {
                    tracing::warn!("Skipping '{}' while laying out slot {}: {}", event.id, key, e);
                    report.failed.push(event.id);
                }
            }
            start += step;
        }

        tracing::debug!(
            "Laid out {} events in slot {} ({} min each, {} failed)",
            report.placed.len(),
            key,
            duration,
            report.failed.len()
        );
        report
    }

    fn is_window_match(&self, event: &SurfaceEvent, key: &SlotKey) -> bool {
        event.slot_tag.is_none()
            && event.is_schedulable()
            && self.config.window_contains(key, event.start)
    }
}

fn place_one(
    surface: &mut dyn RenderSurface,
    id: &EventId,
    key: &SlotKey,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(), PlacementError> {
    surface.set_dates(id, start, end)?;
    surface.set_slot_tag(id, Some(*key))
}
