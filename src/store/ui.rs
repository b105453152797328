//! UI-facing status slice: loading indicator and the single error string

use crate::sync::ErrorInfo;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub is_loading: bool,
    /// Last error message, shown until cleared or superseded
    pub error: Option<String>,
    /// Structured form of `error` when it came from the backend
    pub error_info: Option<ErrorInfo>,
    /// Ledger seq of the command that set `error`, if any
    error_seq: Option<u64>,
    in_flight: usize,
}

impl UiState {
    /// Returns true if the loading flag flipped on
    pub(crate) fn begin_loading(&mut self) -> bool {
        self.in_flight += 1;
        let flipped = !self.is_loading;
        self.is_loading = true;
        flipped
    }

    /// Returns true if the loading flag flipped off
    pub(crate) fn end_loading(&mut self) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let loading = self.in_flight > 0;
        let flipped = self.is_loading && !loading;
        self.is_loading = loading;
        flipped
    }

    pub(crate) fn set_error(&mut self, message: String, info: Option<ErrorInfo>, seq: Option<u64>) {
        self.error = Some(message);
        self.error_info = info;
        self.error_seq = seq;
    }

    pub(crate) fn clear_error(&mut self) -> bool {
        let had = self.error.is_some();
        self.error = None;
        self.error_info = None;
        self.error_seq = None;
        had
    }

    /// Clear the error only if command `seq` set it
    pub(crate) fn clear_error_of(&mut self, seq: u64) -> bool {
        if self.error_seq != Some(seq) {
            return false;
        }
        self.clear_error()
    }
}
