//! InMemory render surface 実装
//!
//! ドメイン層が定義する `RenderSurface` trait の具体的な実装。
//! 描画を持たない環境（CLI やテスト）でカレンダーのイベント一覧を保持します。

use chrono::NaiveDateTime;

use crate::{
    domain::{EventId, RenderSurface, SlotKey, SurfaceEvent},
    error::PlacementError,
};

/// インメモリの render surface
///
/// イベントは追加順に保持されます。同じ ID のイベントを追加すると置き換えになります。
#[derive(Debug, Clone, Default)]
pub struct InMemorySurface {
    events: Vec<SurfaceEvent>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn find_mut(&mut self, id: &EventId) -> Result<&mut SurfaceEvent, PlacementError> {
        self.events
            .iter_mut()
            .find(|event| &event.id == id)
            .ok_or_else(|| PlacementError::UnknownEvent(id.to_string()))
    }
}

impl RenderSurface for InMemorySurface {
    fn events(&self) -> Vec<SurfaceEvent> {
        self.events.clone()
    }

    fn event_by_id(&self, id: &EventId) -> Option<SurfaceEvent> {
        self.events.iter().find(|event| &event.id == id).cloned()
    }

    fn add_event(&mut self, event: SurfaceEvent) {
        match self.events.iter().position(|e| e.id == event.id) {
            Some(idx) => self.events[idx] = event,
            None => self.events.push(event),
        }
    }

    fn set_dates(
        &mut self,
        id: &EventId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), PlacementError> {
        if end < start {
            return Err(PlacementError::Rejected {
                id: id.to_string(),
                reason: "end before start".to_string(),
            });
        }
        let event = self.find_mut(id)?;
        event.start = start;
        event.end = Some(end);
        Ok(())
    }

    fn set_slot_tag(&mut self, id: &EventId, tag: Option<SlotKey>) -> Result<(), PlacementError> {
        self.find_mut(id)?.slot_tag = tag;
        Ok(())
    }

    fn remove_event(&mut self, id: &EventId) -> Option<SurfaceEvent> {
        let idx = self.events.iter().position(|event| &event.id == id)?;
        Some(self.events.remove(idx))
    }
}
