//! Core types for converting DDI metadata documents into catalog records.
//!
//! Flow: raw bytes → [`document::Document`] → [`plugin::Converter`] staged
//! against a [`store::Revision`] → committed through a
//! [`store::CatalogStore`]. The [`pipeline::Pipeline`] selects the converter
//! by schema version and owns the failure policy.

pub mod blob;
pub mod document;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod plugin;
pub mod record;
pub mod store;
pub mod tags;
pub mod vocab;
