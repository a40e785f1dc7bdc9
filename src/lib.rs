//! Passport OCR: turns photos of a passport's data page into customer
//! records by reconciling a machine-readable-zone transcript with a
//! Chinese-text transcript.

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod passport;
pub mod quota;
pub mod recognition;
pub mod server;
