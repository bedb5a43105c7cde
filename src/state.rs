//! State module.
//!
//! This module contains the client-side state of the notification layer:
//! the strict payload model, the reconciled inbox collection and the
//! role-based deep-link resolution.

pub mod inbox;
pub mod notification;
pub mod role;

/// Unique ID of a notification, used for deduplication.
pub type NotificationId = i64;

/// Unique ID of the request (demande) a notification refers to.
pub type DemandeId = i64;

/// Connection status of the push channel.
///
/// Process-wide: there is one transport connection per authenticated
/// session, so one status value at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake completed, destination subscribed.
    Connected,
    /// No active connection. The reconnect policy of the transport
    /// governs recovery.
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    /// Returns boolean indicating if the channel is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}
