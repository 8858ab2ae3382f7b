//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the subscribe endpoint and
//! its per-connection writer loop. The core infrastructure (Manager,
//! ConnectionRegistry, envelopes, wire framing) lives in the `broker` crate.

pub(crate) mod handler;
