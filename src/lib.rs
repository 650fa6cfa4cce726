//! conntop library: interactive per-process network activity monitor.
//!
//! The pipeline: a platform [`Sampler`](platform::Sampler) produces raw
//! attributed sockets and interface counters, the
//! [`Collector`](collector::Collector) turns counter deltas into smoothed
//! rates and aggregates them into immutable [`Snapshot`](model::Snapshot)s,
//! and a TUI, recorder, or line-structured exporter consumes them from a
//! one-slot drop-oldest channel.

pub mod collector;
pub mod error;
pub mod geo;
pub mod model;
pub mod output;
pub mod platform;
pub mod recorder;
pub mod ring_buffer;
pub mod service;
pub mod ui;
