//! Remote API boundary.
//!
//! ARCHITECTURE
//! ============
//! `rest` owns the HTTP transport. `auth` defines the session-facing
//! [`auth::AuthApi`] seam and `http` implements it over `rest`. `catalog`
//! exposes read-only typed clients for browseable resources, each a distinct
//! named client even though they share one transport.

pub mod auth;
pub mod catalog;
pub mod http;
pub mod rest;
pub mod types;
