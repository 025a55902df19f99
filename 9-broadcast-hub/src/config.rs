/// Route the WebSocket endpoint is served on.
pub const WS_PATH: &str = "/ws";

/// Address used when nothing else is given on the command line.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:12345";

/// Tuning knobs for the hub's queues and relay behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Messages buffered per connection before it is considered unresponsive
    /// and evicted.
    pub queue_capacity: usize,
    /// Events buffered in front of the control loop. Producers wait briefly
    /// when it is full.
    pub event_capacity: usize,
    /// Deliver relayed messages back to their sender as well.
    pub echo_to_sender: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            event_capacity: 256,
            echo_to_sender: false,
        }
    }
}
