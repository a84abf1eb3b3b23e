//! Shared helpers for the DDI converters: XML text handling, byte decoding,
//! and name/key munging.

pub mod encoding;
pub mod munge;
pub mod xml;
