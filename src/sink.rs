use crate::event::{ButtonEvent, MouseSample};

/// Consumer of coalesced pointer updates.
///
/// All methods are called from the dispatch thread, never from the hook
/// callback. Implementations should hand work off quickly; a slow sink delays
/// the next batch. Errors are counted and the event is dropped.
pub trait DispatchSink: Send + Sync {
    fn on_mouse_sample(&self, sample: MouseSample) -> anyhow::Result<()>;

    fn on_button_event(&self, event: ButtonEvent) -> anyhow::Result<()>;

    fn on_drag_state_changed(&self, has_active_drag: bool, file_count: usize)
        -> anyhow::Result<()>;
}

/// Sink that drops everything. Useful when only the query surface is needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DispatchSink for NullSink {
    fn on_mouse_sample(&self, _sample: MouseSample) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_button_event(&self, _event: ButtonEvent) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_drag_state_changed(&self, _has_active_drag: bool, _file_count: usize) -> anyhow::Result<()> {
        Ok(())
    }
}
