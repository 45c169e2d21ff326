//! Session adapters backed by real browser runtimes.

pub mod chromiumoxide;
