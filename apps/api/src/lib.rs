//! Assistant chat backend for the resume builder.
//!
//! The transcript core lives in [`chat`]: decoding stored turns of any schema
//! vintage, merging paginated history with the live session, and deriving tool
//! call status. Everything else is the HTTP and storage shell around it.

pub mod chat;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod state;
