use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::actions::ActionOutcome;
use crate::cache::{CacheEvent, EventSink, RelatedGroup};
use crate::error::CoreError;
use crate::model::ResourceRecord;
use crate::vault::ProbedCandidate;

use super::screen::FrameId;

/// Results handed from worker threads to the foreground loop.
#[derive(Debug)]
pub enum UiEvent {
    Cache(CacheEvent),
    ActionFinished(ActionOutcome),
    Described {
        frame: FrameId,
        result: Result<ResourceRecord, CoreError>,
    },
    RelatedResolved {
        frame: FrameId,
        result: Result<Vec<RelatedGroup>, CoreError>,
    },
    ImportProbed {
        source: String,
        result: Result<Vec<ProbedCandidate>, String>,
    },
    /// Verdict on a context typed into the dialog in `frame`.
    ContextVerified {
        frame: FrameId,
        probed: Vec<ProbedCandidate>,
    },
}

pub type UiSender = UnboundedSender<UiEvent>;
pub type UiReceiver = UnboundedReceiver<UiEvent>;

pub fn channel() -> (UiSender, UiReceiver) {
    unbounded_channel()
}

/// Cache event sink that forwards into the UI queue.
pub fn cache_sink(tx: UiSender) -> EventSink {
    std::sync::Arc::new(move |ev| {
        let _ = tx.send(UiEvent::Cache(ev));
    })
}
