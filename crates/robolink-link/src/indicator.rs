/// Hook for activity side effects such as blinking status LEDs.
///
/// Called from the loop threads right before a packet is written and right after a
/// raw frame is read. Implementations must be quick; they run inline.
pub trait ActivityIndicator: Send + Sync {
    fn on_transmit(&self) {}
    fn on_receive(&self) {}
}

/// Indicator that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl ActivityIndicator for NoIndicator {}
