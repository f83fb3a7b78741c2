//! Terminal rendering for joulebar.
//!
//! Everything here takes already-derived state from [`joulebar_core`] and
//! draws it with [`ratatui`]; no value is computed twice.

pub mod chart;
pub mod dashboard;
pub mod layout;
