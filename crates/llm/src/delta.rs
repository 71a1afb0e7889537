use doodle_tool_runtime::CompletionResponse;

/// Turns cumulative streaming updates into new-text fragments.
///
/// Each update carries everything generated so far; the fragment is the part
/// beyond what was already emitted. Nothing is emitted once an update has
/// carried a stop reason. An update that does not extend the emitted text
/// (a retried attempt starting over) emits nothing until it catches up.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    emitted: String,
    stopped: bool,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// New text carried by `update`, if any.
    pub fn update(&mut self, update: &CompletionResponse) -> Option<String> {
        if self.stopped {
            return None;
        }
        if update.stop_reason.is_some() {
            self.stopped = true;
            return None;
        }

        let delta = update.text.strip_prefix(self.emitted.as_str())?;
        if delta.is_empty() {
            return None;
        }
        let delta = delta.to_string();
        self.emitted.push_str(&delta);
        Some(delta)
    }
}
