//! DDI-Codebook input: turns a `codeBook` document into a catalog record.
//!
//! Besides the record itself, a newly created record gets the raw document
//! and, when the codebook has a data description, the variable and category
//! tables attached as stored resources.

pub mod fields;

use log::{debug, info};

use ddi_core::document::Document;
use ddi_core::error::{DdiError, Result};
use ddi_core::plugin::{Conversion, ConversionContext, Converter};
use ddi_core::record::{CatalogRecord, EntityRef, Resource, SchemaVersion};
use ddi_core::store::Revision;
use ddi_core::tags::{apply_tags, resolve_keyword, TagPolicy};
use ddi_output_csv::export_data_description;
use ddi_utils::munge::munge_name;

use crate::fields::Codebook;

pub const VARIABLE_TABLE_DESCRIPTION: &str = "Variable metadata";
pub const CATEGORY_TABLE_DESCRIPTION: &str = "Variable code values";

pub struct CodebookConverter;

impl Converter for CodebookConverter {
    fn name(&self) -> &str {
        "DDI-Codebook"
    }

    fn schema(&self) -> SchemaVersion {
        SchemaVersion::Codebook
    }

    fn convert(
        &self,
        document: &Document,
        revision: &mut Revision<'_>,
        ctx: &mut ConversionContext<'_>,
    ) -> Result<Conversion> {
        let cb = Codebook::new(document.root());

        let study_id = cb
            .study_id()
            .ok_or_else(|| DdiError::Malformed("codeBook has no study IDNo".to_string()))?;
        let name = munge_name(&study_id.value);
        if name.is_empty() {
            return Err(DdiError::Malformed(format!(
                "IDNo {:?} does not yield a record name",
                study_id.value
            )));
        }

        let existing = revision.record_by_name(&name)?;
        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| CatalogRecord::new(uuid::Uuid::new_v4().to_string(), &name));
        let mut created = Vec::new();
        if is_new {
            created.push(EntityRef::Record(name.clone()));
        }
        info!(
            "{} codebook record {} from {}",
            if is_new { "Creating" } else { "Updating" },
            name,
            ctx.source_url.unwrap_or("<unknown source>")
        );

        record.language = cb.language().map(str::to_string);
        let party = cb.responsible_party().map(str::to_string);
        record.author = party.clone();
        record.maintainer = party;
        if let Some((contact, email)) = cb.contact() {
            if let Some(contact) = contact {
                record.maintainer = Some(contact.to_string());
            }
            if let Some(email) = email {
                record.maintainer_email = Some(email.to_string());
            }
        }

        apply_keywords(&cb, revision, &mut record, ctx)?;

        record.notes = cb.description();
        record.title = cb.title().map(str::to_string);
        record.url = ctx.source_url.map(str::to_string);

        let export = ctx.options.should_export(is_new);
        if export {
            record.attach_resource(ctx.store_original(&study_id.qualified())?);
            if let Some(uri) = cb.holdings_uri() {
                let description = record.title.clone().unwrap_or_default();
                record.attach_resource(Resource::new(uri, description));
            }
        }

        let mut corpus = cb.search_corpus();
        if let Some(data_dscr) = cb.data_description().filter(|_| export) {
            let tables = export_data_description(data_dscr)?;
            let variables = ctx.store_blob(
                &format!("{}_var", name),
                "csv",
                &tables.variables,
                VARIABLE_TABLE_DESCRIPTION,
            )?;
            let categories = ctx.store_blob(
                &format!("{}_code", name),
                "csv",
                &tables.categories,
                CATEGORY_TABLE_DESCRIPTION,
            )?;
            record.attach_resource(variables);
            record.attach_resource(categories);
            corpus.extend(tables.labels);
        }
        record.extras.set("ddi_extras", corpus.join(" "));

        if let Some(distributor) = cb.distributor() {
            record.extras.set("publisher", distributor);
        }
        if let Some(date) = cb.production_date() {
            record.version = Some(date.to_string());
        }

        record
            .extras
            .set("title_0", record.title.clone().unwrap_or_default());
        record
            .extras
            .set("lang_title_0", record.language.clone().unwrap_or_default());
        for (i, parallel) in cb.parallel_titles().into_iter().enumerate() {
            record.extras.set(format!("title_{}", i + 1), parallel.title);
            record.extras.set(format!("lang_title_{}", i + 1), parallel.lang);
        }

        if let Some(producer) = cb.last_producer() {
            record.extras.set("producer", producer);
        }
        if let Some(contributor) = cb.contributor() {
            record.extras.set("contributor", contributor);
        }
        for (i, author) in cb.authors().into_iter().enumerate() {
            record.extras.set(format!("author_{}", i + 1), author.name);
            record
                .extras
                .set(format!("organization_{}", i + 1), author.organization);
        }

        for producer in cb.producer_names() {
            if revision.add_group_member(producer, &mut record)? {
                created.push(EntityRef::Group(producer.to_string()));
            }
        }

        let record_id = record.id.clone();
        revision.put_record(record);
        Ok(Conversion {
            record_id,
            record_name: name,
            is_new,
            created,
        })
    }
}

/// Resolve subject keywords into tags and `tag_source_N` extras.
fn apply_keywords(
    cb: &Codebook<'_>,
    revision: &mut Revision<'_>,
    record: &mut CatalogRecord,
    ctx: &ConversionContext<'_>,
) -> Result<()> {
    let stale: Vec<String> = record
        .extras
        .keys_with_prefix("tag_source_")
        .map(str::to_string)
        .collect();
    for key in stale {
        record.extras.remove(&key);
    }

    let policy = TagPolicy::Normalized {
        max_length: ctx.options.tag_max_length,
    };
    let mut source_idx = 0;
    for raw in cb.keywords() {
        let Some(resolved) = resolve_keyword(raw, ctx.options, ctx.vocabulary)? else {
            debug!("Skipping blank keyword");
            continue;
        };
        if let Some(source) = resolved.source {
            record
                .extras
                .set(format!("tag_source_{}", source_idx), source);
            source_idx += 1;
        }
        apply_tags(revision, record, &resolved.tags, policy)?;
    }
    Ok(())
}
