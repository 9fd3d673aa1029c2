//! Keeps a render surface in step with the snapshot.
//!
//! Notifications coming out of the store are turned into surface edits, and
//! every slot an edit touches is reflowed. Local drags go the other way: the
//! surface is updated first and a `modify_reservation` mutation is returned
//! for the caller to send.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde_json::{Value, json};
use yoyaku_shared::time::Clock;

use crate::{
    config::CalendarConfig,
    domain::{
        EventId, EventKind, Notification, RenderSurface, Reservation, SlotKey, Snapshot,
        SurfaceEvent, VacationPeriod,
        slot::{parse_date, parse_raw_time},
    },
    error::PlacementError,
    infrastructure::dto::websocket::OutboundMessage,
};

use super::{
    local_move::LocalMoveRegistry,
    reflow::{ReflowEngine, ReflowOptions, ReflowReport},
};

const VACATION_TITLE: &str = "Vacation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The surface was edited; one report per reflowed slot
    Applied(Vec<ReflowReport>),
    /// Echo of a local move, dropped
    Suppressed,
    /// Nothing for the calendar in this notification
    Ignored,
}

pub struct CalendarSync {
    engine: ReflowEngine,
    registry: LocalMoveRegistry,
}

impl CalendarSync {
    pub fn new(config: CalendarConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: ReflowEngine::new(config.slots),
            registry: LocalMoveRegistry::with_window(clock, config.suppression_window_ms),
        }
    }

    pub fn engine(&self) -> &ReflowEngine {
        &self.engine
    }

    /// Rebuild the surface from a full snapshot and lay out every slot
    pub fn load_snapshot(
        &mut self,
        surface: &mut dyn RenderSurface,
        snapshot: &Snapshot,
    ) -> Vec<ReflowReport> {
        for event in surface.events() {
            surface.remove_event(&event.id);
        }
        add_vacation_markers(surface, &snapshot.vacation_periods);

        let mut slots = BTreeSet::new();
        for reservation in snapshot.all_reservations() {
            let Some(event) = reservation_event(reservation) else {
                tracing::warn!(
                    "Reservation '{}' has no usable date/time ({} {}), not shown",
                    reservation.id,
                    reservation.date,
                    reservation.time_slot
                );
                continue;
            };
            if event.is_schedulable()
                && let Some(slot) = self.engine.slot_of(&event)
            {
                slots.insert(slot);
            }
            surface.add_event(event);
        }

        slots
            .into_iter()
            .map(|slot| self.engine.reflow_key(surface, slot, ReflowOptions::default()))
            .collect()
    }

    /// Apply one store notification to the surface
    pub fn apply(
        &mut self,
        surface: &mut dyn RenderSurface,
        notification: &Notification,
        snapshot: &Snapshot,
        drag_in_progress: bool,
    ) -> SyncOutcome {
        match notification {
            Notification::SnapshotReplaced => {
                SyncOutcome::Applied(self.load_snapshot(surface, snapshot))
            }
            Notification::ReservationChanged { reservation, .. } => {
                self.apply_remote_reservation(surface, reservation, drag_in_progress)
            }
            Notification::VacationPeriodsChanged(periods) => {
                let markers: Vec<EventId> = surface
                    .events()
                    .into_iter()
                    .filter(|event| event.kind == EventKind::VacationMarker)
                    .map(|event| event.id)
                    .collect();
                for id in markers {
                    surface.remove_event(&id);
                }
                add_vacation_markers(surface, periods);
                SyncOutcome::Applied(Vec::new())
            }
            _ => SyncOutcome::Ignored,
        }
    }

    /// Upsert a reservation pushed by the server and reflow what it touched
    pub fn apply_remote_reservation(
        &mut self,
        surface: &mut dyn RenderSurface,
        reservation: &Reservation,
        drag_in_progress: bool,
    ) -> SyncOutcome {
        let id = EventId::from(&reservation.id);
        if self.registry.should_suppress(&id, drag_in_progress) {
            tracing::debug!("Suppressed echo of local move for '{}'", id);
            return SyncOutcome::Suppressed;
        }
        let Some(event) = reservation_event(reservation) else {
            tracing::warn!(
                "Reservation '{}' has no usable date/time, leaving calendar as is",
                reservation.id
            );
            return SyncOutcome::Ignored;
        };

        let old_slot = surface
            .event_by_id(&id)
            .and_then(|current| self.engine.slot_of(&current));
        let new_slot = if event.is_schedulable() {
            self.engine.slot_of(&event)
        } else {
            None
        };
        surface.add_event(event);

        SyncOutcome::Applied(self.reflow_pair(surface, old_slot, new_slot))
    }

    /// Optimistically move an event and build the mutation to send
    pub fn local_move(
        &mut self,
        surface: &mut dyn RenderSurface,
        id: &EventId,
        new_start: NaiveDateTime,
    ) -> Result<OutboundMessage, PlacementError> {
        let event = surface
            .event_by_id(id)
            .ok_or_else(|| PlacementError::UnknownEvent(id.to_string()))?;
        let old_slot = self.engine.slot_of(&event);
        let length = event.end.map(|end| end - event.start).unwrap_or_else(|| {
            TimeDelta::minutes(i64::from(self.engine.config().standard_duration_minutes))
        });

        self.registry.mark_moved(id.clone());
        surface.set_dates(id, new_start, new_start + length)?;
        surface.set_slot_tag(id, None)?;

        let new_slot = self.engine.config().slot_key_for(new_start).ok();
        let reports = self.reflow_pair(surface, old_slot, new_slot);
        tracing::info!(
            "Moved '{}' to {} ({} slots reflowed)",
            id,
            new_start.format("%Y-%m-%d %H:%M"),
            reports.len()
        );

        Ok(OutboundMessage::mutation(
            "modify_reservation",
            json!({
                "id": wire_id(id),
                "date": new_start.format("%Y-%m-%d").to_string(),
                "time_slot": new_start.format("%H:%M").to_string(),
            }),
        ))
    }

    /// Compact the slot an event left, then lay out the slot it entered
    fn reflow_pair(
        &self,
        surface: &mut dyn RenderSurface,
        old_slot: Option<SlotKey>,
        new_slot: Option<SlotKey>,
    ) -> Vec<ReflowReport> {
        let mut reports = Vec::with_capacity(2);
        if let Some(old) = old_slot
            && Some(old) != new_slot
        {
            reports.push(
                self.engine
                    .reflow_key(surface, old, ReflowOptions::strict_only()),
            );
        }
        if let Some(new) = new_slot {
            reports.push(self.engine.reflow_key(surface, new, ReflowOptions::default()));
        }
        reports
    }
}

fn reservation_event(reservation: &Reservation) -> Option<SurfaceEvent> {
    let date = parse_date(&reservation.date)?;
    let time = parse_raw_time(&reservation.time_slot).ok()?;
    Some(SurfaceEvent {
        id: EventId::from(&reservation.id),
        title: reservation.title().to_string(),
        start: date.and_time(time),
        end: None,
        kind: EventKind::Reservation,
        appointment_type: u8::from(reservation.reservation_type),
        cancelled: reservation.cancelled,
        slot_tag: None,
    })
}

fn add_vacation_markers(surface: &mut dyn RenderSurface, periods: &[VacationPeriod]) {
    for period in periods {
        surface.add_event(SurfaceEvent {
            id: EventId::new(format!("vacation-{}-{}", period.start, period.end)),
            title: VACATION_TITLE.to_string(),
            start: period.start.and_time(NaiveTime::MIN),
            end: period.end.succ_opt().map(|day| day.and_time(NaiveTime::MIN)),
            kind: EventKind::VacationMarker,
            appointment_type: u8::MAX,
            cancelled: false,
            slot_tag: None,
        });
    }
}

/// Numeric ids go back to the server as numbers
fn wire_id(id: &EventId) -> Value {
    id.as_str()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{CustomerKey, ReservationChange, ReservationId, ReservationType},
        infrastructure::surface::InMemorySurface,
    };
    use chrono::NaiveDate;
    use serde_json::Map;
    use std::collections::HashMap;
    use yoyaku_shared::time::ManualClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - スナップショットからカレンダーを組み立てて枠ごとに配置すること
    // - サーバーからの移動で旧枠が詰められ新枠に配置されること
    // - ローカル移動の直後に届く自分の更新が抑止されること
    //
    // 【なぜこのテストが必要か】
    // - 通知 → 画面更新の経路はクライアントの主要な動作であり、
    //   旧枠の詰め直し漏れや自分の更新による巻き戻りは目に見える不具合になる
    // ========================================

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn reservation(id: &str, name: &str, time: &str) -> Reservation {
        Reservation {
            id: ReservationId::new(id),
            customer_key: CustomerKey::new(name.to_lowercase()),
            date: "2024-05-01".to_string(),
            time_slot: time.to_string(),
            reservation_type: ReservationType::CheckUp,
            cancelled: false,
            display_name: name.to_string(),
            extra: Map::new(),
            verified: true,
        }
    }

    fn snapshot(reservations: Vec<Reservation>, vacations: Vec<VacationPeriod>) -> Snapshot {
        let mut lists: HashMap<CustomerKey, Vec<Reservation>> = HashMap::new();
        for r in reservations {
            lists.entry(r.customer_key.clone()).or_default().push(r);
        }
        Snapshot::from_parts(lists, HashMap::new(), vacations, None)
    }

    fn changed(reservation: Reservation) -> Notification {
        Notification::ReservationChanged {
            change: ReservationChange::Updated,
            reservation,
            previous: None,
        }
    }

    fn start_of(surface: &InMemorySurface, id: &str) -> NaiveDateTime {
        surface.event_by_id(&EventId::new(id)).unwrap().start
    }

    fn loaded() -> (Arc<ManualClock>, CalendarSync, InMemorySurface) {
        let clock = Arc::new(ManualClock::new(0));
        let mut sync = CalendarSync::new(CalendarConfig::default(), clock.clone());
        let mut surface = InMemorySurface::new();
        sync.load_snapshot(
            &mut surface,
            &snapshot(
                vec![reservation("1", "Alice", "09:00"), reservation("2", "Bob", "09:30")],
                Vec::new(),
            ),
        );
        (clock, sync, surface)
    }

    #[test]
    fn test_load_snapshot_lays_out_shared_slot() {
        // テスト項目: スナップショット読み込みで同じ枠の予約が重ならずに並ぶ
        // given (前提条件):
        let clock = Arc::new(ManualClock::new(0));
        let mut sync = CalendarSync::new(CalendarConfig::default(), clock);
        let mut surface = InMemorySurface::new();
        let vacation = VacationPeriod {
            start: NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 8, 12).unwrap(),
        };
        let state = snapshot(
            vec![reservation("1", "Alice", "09:00"), reservation("2", "Bob", "09:30")],
            vec![vacation],
        );

        // when (操作):
        let reports = sync.load_snapshot(&mut surface, &state);

        // then (期待する結果):
        assert_eq!(reports.len(), 1);
        assert_eq!(start_of(&surface, "1"), at(9, 0));
        assert_eq!(start_of(&surface, "2"), at(9, 21));
        assert_eq!(surface.len(), 3);
        let marker = surface
            .event_by_id(&EventId::new("vacation-2024-08-10-2024-08-12"))
            .unwrap();
        assert_eq!(marker.kind, EventKind::VacationMarker);
    }

    #[test]
    fn test_remote_move_compacts_old_slot() {
        // テスト項目: サーバーからの移動で旧枠が詰められ、新しい枠に配置される
        // given (前提条件):
        let (_clock, mut sync, mut surface) = loaded();

        // when (操作):
        let outcome = sync.apply(
            &mut surface,
            &changed(reservation("1", "Alice", "13:10")),
            &Snapshot::default(),
            false,
        );

        // then (期待する結果):
        let SyncOutcome::Applied(reports) = outcome else {
            panic!("expected the move to be applied");
        };
        assert_eq!(reports.len(), 2);
        assert_eq!(start_of(&surface, "1"), at(13, 0));
        assert_eq!(start_of(&surface, "2"), at(9, 0));
    }

    #[test]
    fn test_remote_cancellation_leaves_event_in_place() {
        // テスト項目: キャンセルされた予約は配置対象から外れ、残りが詰められる
        // given (前提条件):
        let (_clock, mut sync, mut surface) = loaded();
        let mut cancelled = reservation("1", "Alice", "09:00");
        cancelled.cancelled = true;

        // when (操作):
        sync.apply(&mut surface, &changed(cancelled), &Snapshot::default(), false);

        // then (期待する結果):
        assert!(surface.event_by_id(&EventId::new("1")).unwrap().cancelled);
        assert_eq!(start_of(&surface, "2"), at(9, 0));
    }

    #[test]
    fn test_local_move_returns_mutation_and_suppresses_echo() {
        // テスト項目: ローカル移動は modify_reservation を返し、直後の自分の更新は 1 回抑止される
        // given (前提条件):
        let (clock, mut sync, mut surface) = loaded();
        let id = EventId::new("1");

        // when (操作):
        let mutation = sync.local_move(&mut surface, &id, at(13, 10)).unwrap();
        clock.advance(200);
        let echo = sync.apply(
            &mut surface,
            &changed(reservation("1", "Alice", "13:10")),
            &Snapshot::default(),
            true,
        );
        let later = sync.apply(
            &mut surface,
            &changed(reservation("1", "Alice", "13:10")),
            &Snapshot::default(),
            true,
        );

        // then (期待する結果):
        assert_eq!(
            mutation,
            OutboundMessage::mutation(
                "modify_reservation",
                json!({"id": 1, "date": "2024-05-01", "time_slot": "13:10"})
            )
        );
        assert_eq!(echo, SyncOutcome::Suppressed);
        assert!(matches!(later, SyncOutcome::Applied(_)));
        assert_eq!(start_of(&surface, "1"), at(13, 0));
        assert_eq!(start_of(&surface, "2"), at(9, 0));
    }

    #[test]
    fn test_local_move_of_unknown_event_fails() {
        // テスト項目: カレンダーにないイベントの移動はエラーになる
        // given (前提条件):
        let (_clock, mut sync, mut surface) = loaded();

        // when (操作):
        let result = sync.local_move(&mut surface, &EventId::new("404"), at(10, 0));

        // then (期待する結果):
        assert_eq!(result, Err(PlacementError::UnknownEvent("404".to_string())));
    }

    #[test]
    fn test_vacation_change_replaces_markers() {
        // テスト項目: 休暇期間の変更で古いマーカーが新しいものに置き換わる
        // given (前提条件):
        let (_clock, mut sync, mut surface) = loaded();
        let periods = Arc::new(vec![VacationPeriod {
            start: NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
        }]);

        // when (操作):
        sync.apply(
            &mut surface,
            &Notification::VacationPeriodsChanged(periods.clone()),
            &Snapshot::default(),
            false,
        );
        sync.apply(
            &mut surface,
            &Notification::VacationPeriodsChanged(periods),
            &Snapshot::default(),
            false,
        );

        // then (期待する結果):
        let markers: Vec<SurfaceEvent> = surface
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::VacationMarker)
            .collect();
        assert_eq!(markers.len(), 1);
        let day_after = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        assert_eq!(markers[0].end, Some(day_after.and_time(NaiveTime::MIN)));
    }

    #[test]
    fn test_side_channel_notification_is_ignored() {
        // テスト項目: カレンダーに関係しない通知は無視される
        // given (前提条件):
        let (_clock, mut sync, mut surface) = loaded();

        // when (操作):
        let outcome = sync.apply(
            &mut surface,
            &Notification::MetricsUpdated(json!({})),
            &Snapshot::default(),
            false,
        );

        // then (期待する結果):
        assert_eq!(outcome, SyncOutcome::Ignored);
    }
}
