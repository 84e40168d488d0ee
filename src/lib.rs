//! Core library shared by the live counting binary and the offline
//! aggregator: the detector state machine, cross-hose pairing, the event log
//! wire format, daily aggregation, sample acquisition backends, and
//! configuration.

pub mod acquisition;
pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod eventlog;
pub mod pairing;
