//! InfluxDB v2 implementation of [`ReadingSource`](crate::services::reading_source::ReadingSource).
//!
//! [`InfluxSettings`] comes from the environment, [`query`] builds the Flux
//! text and [`InfluxClient`] runs it over HTTP, decoding the annotated CSV
//! response.

mod client;
pub mod query;

pub use client::{InfluxClient, InfluxSettings};
