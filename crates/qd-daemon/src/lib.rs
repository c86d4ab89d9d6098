//! HTTP daemon for the QuickDraw settlement backend.
//!
//! Thin shell over `qd-settle`: handlers verify the session, translate JSON
//! into engine calls, and map [`qd_types::SettleError`] onto HTTP statuses.
//! No settlement decision is made in this crate.

pub mod api_types;
pub mod auth;
pub mod routes;
pub mod state;
