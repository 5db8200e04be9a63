/// Render-tick metadata supplied by the host map engine.
///
/// One `Frame` per `render` callback. Frames are small and pure so a session
/// can be driven deterministically in tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Host clock at the start of the frame (milliseconds).
    pub time_ms: u64,
}

impl Frame {
    pub fn new(index: u64, time_ms: u64) -> Self {
        Self { index, time_ms }
    }

    /// The following frame; time never moves backwards.
    pub fn next(self, time_ms: u64) -> Self {
        Self::new(self.index + 1, time_ms.max(self.time_ms))
    }
}
