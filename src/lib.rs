#![cfg_attr(not(test), no_std)]

//! dcc-teststand - firmware core of a DCC decoder test station
//!
//! This library provides the hardware-independent core of a test station for
//! DCC (Digital Command Control) decoders: a command station that generates
//! the DCC waveform from a timer-update interrupt, a decoder that reconstructs
//! packets from timer input-capture samples, flash-backed persistent
//! parameters, averaged analog feedback, and a line-oriented JSON-RPC control
//! surface for the host PC test orchestrator.
//!
//! Hardware access goes through the traits in [`platform::traits`]; the
//! `mock` feature (enabled by default) provides in-memory implementations so
//! the whole stack runs in host tests. The `embassy` feature adds the
//! on-target task loops in [`tasks`].

extern crate alloc;

pub mod logging;
pub mod sync;

pub mod platform;

pub mod dcc;

pub mod analog;
pub mod decoder;
pub mod parameters;
pub mod station;

pub mod rpc;

pub mod app;

#[cfg(feature = "embassy")]
pub mod tasks;
