use foundation::{LonLat, RecordId};

use crate::frame::Frame;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModalKind {
    PhotoViewer,
    Dashboard,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Application events shared between the session components.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    RelocationStart {
        id: RecordId,
        raw_timestamp: Option<String>,
        previous: Option<LonLat>,
    },
    RelocationCommitted {
        id: RecordId,
        position: LonLat,
    },
    RelocationCancelled,
    ModalOpen(ModalKind),
    ModalClose(ModalKind),
    /// User-facing toast text.
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

impl AppEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AppEvent::RelocationStart { .. } => "relocation-start",
            AppEvent::RelocationCommitted { .. } => "relocation-committed",
            AppEvent::RelocationCancelled => "relocation-cancelled",
            AppEvent::ModalOpen(_) => "modal-open",
            AppEvent::ModalClose(_) => "modal-close",
            AppEvent::Notice { .. } => "notice",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub frame_index: u64,
    pub event: AppEvent,
}

/// Ordered event log drained by the host once per turn of the event loop.
#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, frame: Frame, event: AppEvent) {
        tracing::trace!(kind = event.kind(), frame = frame.index, "event");
        self.events.push(Event {
            frame_index: frame.index,
            event,
        });
    }

    pub fn notice(&mut self, frame: Frame, level: NoticeLevel, message: impl Into<String>) {
        self.emit(
            frame,
            AppEvent::Notice {
                level,
                message: message.into(),
            },
        );
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppEvent, EventBus, ModalKind, NoticeLevel};
    use crate::frame::Frame;

    #[test]
    fn records_events_with_frame_index() {
        let mut bus = EventBus::new();
        bus.emit(Frame::new(2, 0), AppEvent::ModalOpen(ModalKind::PhotoViewer));
        assert_eq!(bus.events().len(), 1);
        assert_eq!(bus.events()[0].frame_index, 2);
        assert_eq!(bus.events()[0].event.kind(), "modal-open");
    }

    #[test]
    fn drain_clears_events() {
        let mut bus = EventBus::new();
        bus.notice(Frame::default(), NoticeLevel::Success, "Position mise à jour");
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.events().is_empty());
    }
}
