//! Coordination core for Swarmlink.
//!
//! Builds request/response semantics, multi-responder aggregation, targeted
//! addressing, fleet-wide shard health, and long-lived task progress
//! streaming on top of a pub/sub primitive that natively offers only
//! unordered at-least-once broadcast.
//!
//! This crate never touches the transport directly: outbound messages go
//! through the [`outbox::Outbox`] channel and inbound payloads arrive via
//! [`ipc::Ipc::handle_message`]. The Redis wiring lives in
//! `swarmlink-infra`, which keeps everything here testable without a live
//! broker.

pub mod health;
pub mod ipc;
pub mod launch;
pub mod outbox;
pub mod poll;
