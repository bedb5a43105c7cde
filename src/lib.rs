//! # HR Notify
//!
//! Notification layer of the HR leave-management platform. It keeps one
//! live push connection per session, reconciles the stream with the
//! durable history behind the REST API, and exposes the reconciled inbox
//! to the presentation layer.
//!
//! # Implementation notes
//!
//! * The push channel is a plain WebSocket carrying JSON payloads; the
//!   transport normalizes them before they reach anyone else.
//! * Mutations are optimistic where the product calls for it (mark-read)
//!   and server-first everywhere else.
//! * Nothing is persisted locally; the history endpoint is the single
//!   source of truth and the in-memory inbox is a cache over it.

#[cfg(feature = "client")]
pub mod configuration;

#[cfg(feature = "client")]
pub mod controller;
#[cfg(feature = "client")]
pub mod rest;
#[cfg(feature = "client")]
pub mod telemetry;
#[cfg(feature = "client")]
pub mod transport;

pub mod state;
