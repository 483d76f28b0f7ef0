//! Polling sync engine behind the market dashboard.
//!
//! [`workers::Dashboard`] polls price, sentiment, headlines and history for
//! the selected ticker, keeps a bounded activity log and pages through
//! headlines on demand. The presentation layer only reads the published
//! [`state::ViewState`] and calls [`workers::DashboardHandle`] actions.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod workers;
