use serde::{Deserialize, Serialize};

use crate::models::AnomalyEvent;

/// Events emitted by the live push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Connection established and the event stream is being read.
    Connected,
    /// A well-formed anomaly message arrived.
    Anomaly(AnomalyEvent),
    /// The connection ended (error or server close). The channel does not
    /// reconnect on its own; a supervisor may open a new one.
    Disconnected { reason: String },
}
