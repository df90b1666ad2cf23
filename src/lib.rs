// src/lib.rs

//! # Handy Sync
//!
//! Keeps a network-connected Handy in step with local video playback in mpv.
//! Features include:
//!
//! - Optional script rewriting (FunDoubler / FunHalver)
//! - Script upload with failover across cache hosts
//! - Client/server clock offset estimation with an on-disk cooldown
//! - Transport-event driven play/stop commands
//!
//! ## Architecture
//!
//! - `config`: environment configuration
//! - `cli`: command line arguments
//! - `funscript`: script model and transforms
//! - `handy`: device REST client, HTTP transport, clock sync and upload
//! - `player`: mpv IPC adapter and the playback controller
//! - `session`: startup order and the playback loop

pub mod config;
pub mod cli;
pub mod error;
pub mod session;
pub mod video_finder;

/// Script model and deterministic rewrites
pub mod funscript {
    pub mod script;
    pub mod transform;
}

/// Everything that talks to the device or its cloud relays
pub mod handy {
    pub mod transport;
    pub mod api;
    pub mod clock_sync;
    pub mod upload;
}

pub mod player {
    pub mod controller;
    pub mod mpv;
}
