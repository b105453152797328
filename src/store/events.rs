//! Change notifications broadcast to UI adapters

use crate::geometry::ViewState;
use crate::sync::ErrorInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Graph content changed; `revision` is the engine revision after it
    GraphChanged { revision: u64 },
    /// Pan/zoom/size changed
    ViewChanged(ViewState),
    SelectionChanged(Option<String>),
    LoadingChanged(bool),
    /// `ui.error` was set
    Error {
        message: String,
        info: Option<ErrorInfo>,
    },
    ErrorCleared,
    /// A confirmed node's position reached the backend
    PositionSynced { node_id: String },
    QuestsChanged,
    /// A different quest (or none) became active
    SessionChanged { quest_id: Option<String> },
}
