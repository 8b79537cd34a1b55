use upblink_frame::Frame;

/// Upstream consumer of every decoded frame.
///
/// Invoked synchronously on the reader thread for every successfully decoded
/// frame — including ACK/NAK frames that also satisfied an in-flight write.
/// Implementations must not block significantly: this is the reader's hot
/// path, and a stalled listener delays unsolicited state reports.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

impl<F> FrameListener for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) {
        self(frame)
    }
}

/// Listener that ignores every frame. Useful for write-only callers.
pub struct NullListener;

impl FrameListener for NullListener {
    fn on_frame(&self, _frame: &Frame) {}
}
