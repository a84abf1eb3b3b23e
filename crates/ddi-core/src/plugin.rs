//! Converter plugin trait and the per-document context it works in.

use crate::blob::{storage_key, timestamp_label, BlobMetadata, BlobStore};
use crate::document::Document;
use crate::error::Result;
use crate::options::ConverterOptions;
use crate::record::{EntityRef, Resource, SchemaVersion};
use crate::store::Revision;
use crate::vocab::VocabularyExpander;

/// Description of the resource holding the raw harvested document.
pub const ORIGINAL_RECORD_DESCRIPTION: &str = "Original metadata record";

/// A schema-specific converter: document tree → staged catalog writes.
pub trait Converter: Send + Sync {
    /// Human-readable name of this converter.
    fn name(&self) -> &str;

    /// The schema variant this converter understands.
    fn schema(&self) -> SchemaVersion;

    /// Extract one record from `document` into `revision`.
    ///
    /// Implementations must not write to the catalog outside the revision;
    /// blobs go through `ctx`.
    fn convert(
        &self,
        document: &Document,
        revision: &mut Revision<'_>,
        ctx: &mut ConversionContext<'_>,
    ) -> Result<Conversion>;
}

/// Outcome of a successful conversion, before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub record_id: String,
    pub record_name: String,
    /// Whether the record did not exist before this conversion.
    pub is_new: bool,
    /// Entities created by this conversion (owed default roles).
    pub created: Vec<EntityRef>,
}

/// Inputs and collaborators available to a converter for one document.
pub struct ConversionContext<'a> {
    pub source_url: Option<&'a str>,
    pub raw: &'a [u8],
    pub options: &'a ConverterOptions,
    pub vocabulary: &'a dyn VocabularyExpander,
    blobs: &'a mut dyn BlobStore,
    timestamp: String,
}

impl<'a> ConversionContext<'a> {
    pub fn new(
        source_url: Option<&'a str>,
        raw: &'a [u8],
        options: &'a ConverterOptions,
        vocabulary: &'a dyn VocabularyExpander,
        blobs: &'a mut dyn BlobStore,
    ) -> Self {
        Self {
            source_url,
            raw,
            options,
            vocabulary,
            blobs,
            timestamp: timestamp_label(chrono::Local::now()),
        }
    }

    /// Timestamp prefix used for every blob key of this conversion.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Store `data` under `"<timestamp>/<name>.<format>"` and describe it as a
    /// record resource.
    pub fn store_blob(&mut self, name: &str, format: &str, data: &[u8], description: &str) -> Result<Resource> {
        let key = storage_key(&self.timestamp, name, format);
        let metadata = BlobMetadata::content_type(content_type_for(format));
        let stored = self
            .blobs
            .put(&self.options.bucket, &key, data, &metadata)?;
        log::info!("Stored {} ({} bytes)", stored.key, stored.size);

        Ok(Resource::new(self.options.file_url(&stored.key), description)
            .with_format(format)
            .with_size(stored.size))
    }

    /// Store the raw harvested document as `"<timestamp>/<name>.xml"`.
    pub fn store_original(&mut self, name: &str) -> Result<Resource> {
        let raw = self.raw;
        self.store_blob(name, "xml", raw, ORIGINAL_RECORD_DESCRIPTION)
    }
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "xml" => "application/xml",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
