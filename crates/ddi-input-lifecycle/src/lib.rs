//! DDI-Lifecycle input: turns a `DDIInstance` document into a catalog record.
//!
//! One record is produced per document, from the last `StudyUnit` found.
//! Keywords are attached verbatim and there is no tabular export.

use log::{info, warn};

use ddi_core::document::{Document, Element};
use ddi_core::error::{DdiError, Result};
use ddi_core::plugin::{Conversion, ConversionContext, Converter};
use ddi_core::record::{CatalogRecord, SchemaVersion};
use ddi_core::store::Revision;
use ddi_core::tags::{apply_tags, TagPolicy};

pub struct LifecycleConverter;

impl Converter for LifecycleConverter {
    fn name(&self) -> &str {
        "DDI-Lifecycle"
    }

    fn schema(&self) -> SchemaVersion {
        SchemaVersion::Lifecycle
    }

    fn convert(
        &self,
        document: &Document,
        revision: &mut Revision<'_>,
        ctx: &mut ConversionContext<'_>,
    ) -> Result<Conversion> {
        let root = document.root();
        let study = active_study_unit(root)?;
        let name = study
            .non_empty_attr("id")
            .ok_or_else(|| DdiError::Malformed("StudyUnit has no id".to_string()))?
            .to_string();

        let existing = revision.record_by_name(&name)?;
        let is_new = existing.is_none();
        let mut record = existing.unwrap_or_else(|| {
            let id = root
                .non_empty_attr("id")
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            CatalogRecord::new(id, &name)
        });
        info!(
            "{} lifecycle record {} from {}",
            if is_new { "Creating" } else { "Updating" },
            name,
            ctx.source_url.unwrap_or("<unknown source>")
        );

        if ctx.options.should_export(is_new) {
            record.attach_resource(ctx.store_original(&name)?);
        }

        let main_citation = root.child("Citation");
        let study_citation = study.child("Citation");

        if let Some(date) = main_citation
            .and_then(|c| c.find_path(&["PublicationDate", "SimpleDate"]))
            .and_then(Element::trimmed_string)
        {
            record.version = Some(date.to_string());
        }

        let titles: Vec<&Element> = [main_citation, study_citation]
            .into_iter()
            .flatten()
            .flat_map(|c| c.find_all("Title"))
            .collect();
        for (i, title) in titles.iter().enumerate() {
            record
                .extras
                .set(format!("title_{}", i), title.string().unwrap_or_default());
            record
                .extras
                .set(format!("lang_title_{}", i), title_language(title).unwrap_or_default());
        }
        if let Some(first) = titles.first().and_then(|t| t.trimmed_string()) {
            record.title = Some(first.to_string());
        }
        record.url = ctx.source_url.map(str::to_string);

        if let Some(citation) = study_citation {
            apply_citation(citation, &mut record);
        }

        if let Some(content) = study.find_path(&["Abstract", "Content"]) {
            let notes: String = content
                .children()
                .iter()
                .map(|child| child.to_xml().replace('\n', "<br />"))
                .collect();
            record.notes = Some(notes);
        }

        // Keywords are replaced wholesale on every conversion.
        let keywords: Vec<&str> = study
            .find_path(&["Coverage", "TopicalCoverage"])
            .map(|tc| tc.find_all("Keyword").filter_map(Element::string).collect())
            .unwrap_or_default();
        record.tags.clear();
        apply_tags(revision, &mut record, keywords, TagPolicy::Verbatim)?;

        let record_id = record.id.clone();
        revision.put_record(record);
        Ok(Conversion {
            record_id,
            record_name: name,
            is_new,
            // Lifecycle records are not owed default roles.
            created: Vec::new(),
        })
    }
}

/// The last `StudyUnit` in document order.
fn active_study_unit(root: &Element) -> Result<&Element> {
    let units: Vec<&Element> = root.find_all("StudyUnit").collect();
    if units.len() > 1 {
        warn!(
            "Document has {} StudyUnits, converting only the last one",
            units.len()
        );
    }
    units
        .last()
        .copied()
        .ok_or_else(|| DdiError::Malformed("DDIInstance has no StudyUnit".to_string()))
}

/// `xml:lang` of a title, or of its single nested `String`.
fn title_language(title: &Element) -> Option<&str> {
    title.attr("xml:lang").or_else(|| {
        let mut strings = title.children_named("String");
        match (strings.next(), strings.next()) {
            (Some(only), None) => only.attr("xml:lang"),
            _ => None,
        }
    })
}

/// Authors, publisher, rights and contributor from the study citation.
fn apply_citation(citation: &Element, record: &mut CatalogRecord) {
    let creators: Vec<&Element> = citation.find_all("Creator").collect();
    if let Some(first) = creators.first() {
        record.author = first.string().map(str::to_string);
    }
    for (i, creator) in creators.iter().enumerate() {
        record
            .extras
            .set(format!("author_{}", i), creator.string().unwrap_or_default());
        record.extras.set(
            format!("organization_{}", i),
            creator.attr("affiliation").unwrap_or_default(),
        );
    }

    let publisher = citation.find("Publisher").and_then(Element::string);
    record.maintainer = publisher.map(str::to_string);
    if let Some(publisher) = publisher {
        record.extras.set("publisher", publisher);
    }
    if let Some(copyright) = citation.find("Copyright").and_then(Element::string) {
        record.extras.set("licenseURL", copyright);
    }
    if let Some(contributor) = citation.find("Contributor").and_then(Element::string) {
        record.extras.set("contributor", contributor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_core::blob::MemoryBlobStore;
    use ddi_core::options::ConverterOptions;
    use ddi_core::pipeline::{HarvestInput, Pipeline, PipelineBuilder};
    use ddi_core::store::{CatalogStore, MemoryCatalog};

    const INSTANCE: &str = r#"<ddi:DDIInstance xmlns:ddi="ddi:instance:3_1" xmlns:r="ddi:reusable:3_1" xmlns:s="ddi:studyunit:3_1" id="inst-42">
  <r:Citation>
    <r:Title xml:lang="en">Instance title</r:Title>
    <r:PublicationDate><r:SimpleDate>2012-03-01</r:SimpleDate></r:PublicationDate>
  </r:Citation>
  <s:StudyUnit id="study-old">
    <r:Citation><r:Title xml:lang="en">Old study</r:Title></r:Citation>
  </s:StudyUnit>
  <s:StudyUnit id="study-7">
    <r:Citation>
      <r:Title xml:lang="fi">Tutkimus</r:Title>
      <r:Title><r:String xml:lang="sv">Studie</r:String></r:Title>
      <r:Creator affiliation="University">Ann Author</r:Creator>
      <r:Creator>Bob Author</r:Creator>
      <r:Publisher>Data Archive</r:Publisher>
      <r:Contributor>Helper</r:Contributor>
      <r:Copyright>http://creativecommons.org/licenses/by/4.0/</r:Copyright>
    </r:Citation>
    <s:Abstract>
      <r:Content>First line
second line<b>bold</b></r:Content>
    </s:Abstract>
    <r:Coverage>
      <r:TopicalCoverage>
        <r:Keyword>health</r:Keyword>
        <r:Keyword>health</r:Keyword>
        <r:Keyword> spaced </r:Keyword>
      </r:TopicalCoverage>
    </r:Coverage>
  </s:StudyUnit>
</ddi:DDIInstance>"#;

    fn pipeline(options: ConverterOptions) -> Pipeline {
        PipelineBuilder::new()
            .converter(Box::new(LifecycleConverter))
            .options(options)
            .build()
            .unwrap()
    }

    fn convert(xml: &str, catalog: &mut MemoryCatalog, blobs: &mut MemoryBlobStore) -> Result<Option<String>> {
        let doc = Document::parse_str(xml).unwrap();
        let input = HarvestInput {
            document: &doc,
            source_url: Some("http://example.org/ddi3"),
            raw: xml.as_bytes(),
        };
        pipeline(ConverterOptions::default()).run(&input, catalog, blobs, None)
    }

    #[test]
    fn test_last_study_unit_wins() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        assert_eq!(id, "inst-42");
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        assert_eq!(record.name, "study-7");
        assert!(catalog.record_by_name("study-old").unwrap().is_none());
        assert_eq!(record.version.as_deref(), Some("2012-03-01"));
        assert_eq!(record.url.as_deref(), Some("http://example.org/ddi3"));
    }

    #[test]
    fn test_titles_numbered_across_citations() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        let extras = &record.extras;

        assert_eq!(record.title.as_deref(), Some("Instance title"));
        assert_eq!(extras.get("title_0"), Some("Instance title"));
        assert_eq!(extras.get("lang_title_0"), Some("en"));
        assert_eq!(extras.get("title_1"), Some("Tutkimus"));
        assert_eq!(extras.get("lang_title_1"), Some("fi"));
        assert_eq!(extras.get("title_2"), Some("Studie"));
        assert_eq!(extras.get("lang_title_2"), Some("sv"));
        assert!(!extras.contains("title_3"));
    }

    #[test]
    fn test_authors_numbered_from_zero() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        let extras = &record.extras;

        assert_eq!(record.author.as_deref(), Some("Ann Author"));
        assert_eq!(extras.get("author_0"), Some("Ann Author"));
        assert_eq!(extras.get("organization_0"), Some("University"));
        assert_eq!(extras.get("author_1"), Some("Bob Author"));
        assert_eq!(extras.get("organization_1"), Some(""));
        assert_eq!(record.maintainer.as_deref(), Some("Data Archive"));
        assert_eq!(extras.get("publisher"), Some("Data Archive"));
        assert_eq!(extras.get("contributor"), Some("Helper"));
        assert_eq!(
            extras.get("licenseURL"),
            Some("http://creativecommons.org/licenses/by/4.0/")
        );
    }

    #[test]
    fn test_notes_keep_markup_and_line_breaks() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        assert_eq!(
            record.notes.as_deref(),
            Some("First line<br />second line<b>bold</b>")
        );
    }

    #[test]
    fn test_keywords_attached_verbatim() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        assert_eq!(record.tags, vec!["health", "health", " spaced "]);
        assert_eq!(catalog.tags().count(), 2);
    }

    #[test]
    fn test_original_stored_once() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        convert(INSTANCE, &mut catalog, &mut blobs).unwrap();
        let id = convert(INSTANCE, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();

        assert_eq!(blobs.len(), 1);
        assert!(blobs.keys().all(|k| k.ends_with("/study-7.xml")));
        assert_eq!(record.resources.len(), 1);
        assert_eq!(record.resources[0].size, Some(INSTANCE.len() as u64));
        // Re-conversion does not pile up keyword associations.
        assert_eq!(record.tags.len(), 3);
        assert!(catalog.role_grants().is_empty());
    }

    #[test]
    fn test_missing_study_unit_is_malformed() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let err = convert(r#"<DDIInstance id="x"/>"#, &mut catalog, &mut blobs).unwrap_err();
        assert!(err.is_malformed());

        let err = convert(r#"<DDIInstance><StudyUnit/></DDIInstance>"#, &mut catalog, &mut blobs)
            .unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(catalog.revision(), 0);
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_notes_keep_space_between_inline_elements() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();
        let xml = r#"<DDIInstance id="i1"><StudyUnit id="s1"><Abstract>
  <Content><b>Health</b> <i>survey</i></Content>
</Abstract></StudyUnit></DDIInstance>"#;

        let id = convert(xml, &mut catalog, &mut blobs).unwrap().unwrap();
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        assert_eq!(record.notes.as_deref(), Some("<b>Health</b> <i>survey</i>"));
    }

    #[test]
    fn test_shared_instance_id_does_not_replace_other_study() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();
        let first = r#"<DDIInstance id="inst"><StudyUnit id="s1"/></DDIInstance>"#;
        let second = r#"<DDIInstance id="inst"><StudyUnit id="s2"/></DDIInstance>"#;

        assert_eq!(convert(first, &mut catalog, &mut blobs).unwrap().as_deref(), Some("inst"));
        assert_eq!(convert(second, &mut catalog, &mut blobs).unwrap(), None);

        assert_eq!(catalog.records().count(), 1);
        assert!(catalog.record_by_name("s1").unwrap().is_some());
        assert!(catalog.record_by_name("s2").unwrap().is_none());
    }

    #[test]
    fn test_sparse_instance_gets_generated_id() {
        let mut catalog = MemoryCatalog::new();
        let mut blobs = MemoryBlobStore::new();

        let id = convert(r#"<DDIInstance><StudyUnit id="s1"/></DDIInstance>"#, &mut catalog, &mut blobs)
            .unwrap()
            .unwrap();
        assert_eq!(id.len(), 36);
        let record = catalog.record_by_id(&id).unwrap().unwrap();
        assert_eq!(record.name, "s1");
        assert_eq!(record.author, None);
        assert_eq!(record.title, None);
        assert!(record.extras.is_empty());
    }
}
