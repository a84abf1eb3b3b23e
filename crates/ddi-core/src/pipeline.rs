//! Pipeline orchestrator: runs one harvested document through conversion.
//!
//! Per document:
//!   1. Select the converter by the root element's schema version
//!   2. Convert into a fresh revision (blobs are written during this step)
//!   3. Stage default roles for every entity the conversion created
//!   4. Commit the revision in one call
//!   5. Point the harvest tracking handle at the record
//!
//! Blobs are written before the commit; a failed commit can leave an
//! orphaned blob behind but never a half-written record.

use log::{error, info};

use crate::blob::BlobStore;
use crate::document::Document;
use crate::error::{DdiError, Result};
use crate::options::ConverterOptions;
use crate::plugin::{ConversionContext, Converter};
use crate::record::{HarvestObject, SchemaVersion};
use crate::store::{CatalogStore, Revision};
use crate::vocab::{NoVocabulary, VocabularyExpander};

/// One harvested document and where it came from.
pub struct HarvestInput<'a> {
    pub document: &'a Document,
    pub source_url: Option<&'a str>,
    pub raw: &'a [u8],
}

/// The conversion pipeline orchestrator.
pub struct Pipeline {
    converters: Vec<Box<dyn Converter>>,
    options: ConverterOptions,
    vocabulary: Box<dyn VocabularyExpander>,
}

impl Pipeline {
    pub fn new(options: ConverterOptions) -> Self {
        Self {
            converters: Vec::new(),
            options,
            vocabulary: Box::new(NoVocabulary),
        }
    }

    /// Register a converter. A later registration for the same schema wins.
    pub fn add_converter(&mut self, converter: Box<dyn Converter>) {
        self.converters.retain(|c| c.schema() != converter.schema());
        self.converters.push(converter);
    }

    pub fn set_vocabulary(&mut self, vocabulary: Box<dyn VocabularyExpander>) {
        self.vocabulary = vocabulary;
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    pub fn converter_for(&self, schema: SchemaVersion) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.schema() == schema)
            .map(|c| c.as_ref())
    }

    /// Convert one document; the harvester-facing entry point.
    ///
    /// Returns `Ok(Some(record_id))` on success and `Ok(None)` when the
    /// conversion failed (the cause is logged and nothing is committed).
    /// Only [`DdiError::Malformed`] is returned as an error, so the caller can
    /// tell an unidentifiable document from a crashed conversion.
    pub fn run(
        &self,
        input: &HarvestInput<'_>,
        catalog: &mut dyn CatalogStore,
        blobs: &mut dyn BlobStore,
        harvest: Option<&mut HarvestObject>,
    ) -> Result<Option<String>> {
        match self.try_run(input, catalog, blobs, harvest) {
            Ok(record_id) => Ok(Some(record_id)),
            Err(e) if e.is_malformed() => Err(e),
            Err(e) => {
                error!(
                    "DDI conversion of {} failed: {}",
                    input.source_url.unwrap_or("<unknown source>"),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Like [`run`](Self::run) but with every error propagated.
    pub fn try_run(
        &self,
        input: &HarvestInput<'_>,
        catalog: &mut dyn CatalogStore,
        blobs: &mut dyn BlobStore,
        harvest: Option<&mut HarvestObject>,
    ) -> Result<String> {
        let root = input.document.root().name();
        let schema = input
            .document
            .schema()
            .ok_or_else(|| DdiError::UnsupportedSchema(format!("root element <{}>", root)))?;
        let converter = self
            .converter_for(schema)
            .ok_or_else(|| DdiError::Pipeline(format!("No converter registered for {}", schema)))?;

        info!("Running {} converter...", converter.name());
        let mut ctx = ConversionContext::new(
            input.source_url,
            input.raw,
            &self.options,
            self.vocabulary.as_ref(),
            blobs,
        );

        let mut revision = Revision::new(&*catalog);
        let conversion = converter.convert(input.document, &mut revision, &mut ctx)?;
        for entity in &conversion.created {
            revision.grant_default_roles(entity.clone());
        }
        let changes = revision.into_changes();
        catalog.commit(changes)?;

        if let Some(handle) = harvest {
            handle.mark_converted(&conversion.record_id);
        }

        info!(
            "{} record {} ({}) committed",
            if conversion.is_new { "Created" } else { "Updated" },
            conversion.record_name,
            conversion.record_id
        );
        Ok(conversion.record_id)
    }
}

/// Builder for constructing a pipeline.
pub struct PipelineBuilder {
    converters: Vec<Box<dyn Converter>>,
    options: ConverterOptions,
    vocabulary: Option<Box<dyn VocabularyExpander>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            converters: Vec::new(),
            options: ConverterOptions::default(),
            vocabulary: None,
        }
    }

    pub fn converter(mut self, converter: Box<dyn Converter>) -> Self {
        self.converters.push(converter);
        self
    }

    pub fn options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn vocabulary(mut self, vocabulary: Box<dyn VocabularyExpander>) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if self.converters.is_empty() {
            return Err(DdiError::Pipeline("No converter specified".to_string()));
        }
        if self.options.tag_max_length == 0 {
            return Err(DdiError::Config("tag_max_length must be positive".to_string()));
        }

        let mut pipeline = Pipeline::new(self.options);
        for c in self.converters {
            pipeline.add_converter(c);
        }
        if let Some(vocabulary) = self.vocabulary {
            pipeline.set_vocabulary(vocabulary);
        }
        Ok(pipeline)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
