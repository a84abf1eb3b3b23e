//! Keyword → tag normalization.
//!
//! Codebook keywords are classified, trimmed and capped, then associated at
//! most once ([`TagPolicy::Normalized`]). Lifecycle keywords are attached
//! exactly as written ([`TagPolicy::Verbatim`]).

use url::Url;

use ddi_utils::munge::truncate_chars;

use crate::error::Result;
use crate::options::ConverterOptions;
use crate::record::CatalogRecord;
use crate::store::Revision;
use crate::vocab::VocabularyExpander;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPolicy {
    /// Trim, cap at `max_length` characters, skip existing associations.
    Normalized { max_length: usize },
    /// Attach each name as given; only empty names are skipped.
    Verbatim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    /// Concept URL in the configured controlled vocabulary.
    Vocabulary,
    /// Any other http(s) URL.
    Url,
    Text,
}

/// Tags a single keyword turns into, plus the URL to remember as a
/// `tag_source_N` extra when the keyword was a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeyword {
    pub tags: Vec<String>,
    pub source: Option<String>,
}

pub fn classify_keyword(keyword: &str, vocabulary_prefix: &str) -> KeywordKind {
    if !vocabulary_prefix.is_empty() && keyword.starts_with(vocabulary_prefix) {
        return KeywordKind::Vocabulary;
    }
    match Url::parse(keyword) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => KeywordKind::Url,
        _ => KeywordKind::Text,
    }
}

/// Resolve one raw keyword text. Blank keywords resolve to `None`.
///
/// Plain URLs produce no tags: link-shaped tag names break tag pages in
/// the catalog UI, so only the source extra is kept for them.
pub fn resolve_keyword(
    raw: &str,
    options: &ConverterOptions,
    vocabulary: &dyn VocabularyExpander,
) -> Result<Option<ResolvedKeyword>> {
    let keyword = raw.trim();
    if keyword.is_empty() {
        return Ok(None);
    }

    let resolved = match classify_keyword(keyword, &options.vocabulary_prefix) {
        KeywordKind::Vocabulary => ResolvedKeyword {
            tags: vocabulary.expand(keyword)?,
            source: Some(keyword.to_string()),
        },
        KeywordKind::Url => {
            log::debug!("Keyword {} kept as tag source only", keyword);
            ResolvedKeyword {
                tags: Vec::new(),
                source: Some(keyword.to_string()),
            }
        }
        KeywordKind::Text => ResolvedKeyword {
            tags: vec![keyword.to_string()],
            source: None,
        },
    };
    Ok(Some(resolved))
}

/// Upsert each tag and associate it with `record` under `policy`.
/// Returns the number of associations added.
pub fn apply_tags<I, S>(
    revision: &mut Revision<'_>,
    record: &mut CatalogRecord,
    names: I,
    policy: TagPolicy,
) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut added = 0;
    for name in names {
        let name = match policy {
            TagPolicy::Normalized { max_length } => truncate_chars(name.as_ref().trim(), max_length),
            TagPolicy::Verbatim => name.as_ref().to_string(),
        };
        if name.trim().is_empty() {
            continue;
        }

        let tag = revision.ensure_tag(&name)?;
        if matches!(policy, TagPolicy::Normalized { .. }) && record.has_tag(&tag.name) {
            log::debug!("Tag {:?} already on {}", tag.name, record.name);
            continue;
        }
        record.tags.push(tag.name);
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalog;
    use crate::vocab::{NoVocabulary, StaticVocabulary};

    #[test]
    fn test_classify_keyword() {
        let prefix = "http://www.yso.fi";
        assert_eq!(classify_keyword("http://www.yso.fi/onto/yso/p4484", prefix), KeywordKind::Vocabulary);
        assert_eq!(classify_keyword("https://example.org/x", prefix), KeywordKind::Url);
        assert_eq!(classify_keyword("http://", prefix), KeywordKind::Text);
        assert_eq!(classify_keyword("urn:nbn:fi:x", prefix), KeywordKind::Text);
        assert_eq!(classify_keyword("health", prefix), KeywordKind::Text);
        assert_eq!(classify_keyword("http://www.yso.fi/x", ""), KeywordKind::Url);
    }

    #[test]
    fn test_resolve_keyword() {
        let opts = ConverterOptions::default();
        let mut vocab = StaticVocabulary::default();
        vocab.insert("http://www.yso.fi/onto/yso/p4484", vec!["health".into(), "terveys".into()]);

        assert_eq!(resolve_keyword("   ", &opts, &vocab).unwrap(), None);

        let plain = resolve_keyword("  elections ", &opts, &vocab).unwrap().unwrap();
        assert_eq!(plain.tags, vec!["elections"]);
        assert_eq!(plain.source, None);

        let url = resolve_keyword("https://example.org/x", &opts, &vocab).unwrap().unwrap();
        assert!(url.tags.is_empty());
        assert_eq!(url.source.as_deref(), Some("https://example.org/x"));

        let concept = resolve_keyword("http://www.yso.fi/onto/yso/p4484", &opts, &vocab).unwrap().unwrap();
        assert_eq!(concept.tags, vec!["health", "terveys"]);
        assert_eq!(concept.source.as_deref(), Some("http://www.yso.fi/onto/yso/p4484"));

        let unknown = resolve_keyword("http://www.yso.fi/onto/yso/p1", &opts, &NoVocabulary).unwrap().unwrap();
        assert!(unknown.tags.is_empty());
        assert!(unknown.source.is_some());
    }

    #[test]
    fn test_apply_tags_normalized_dedups_and_caps() {
        let catalog = MemoryCatalog::new();
        let mut revision = Revision::new(&catalog);
        let mut record = CatalogRecord::new("1", "abc");
        let long = "k".repeat(150);

        let added = apply_tags(
            &mut revision,
            &mut record,
            ["health", " health ", long.as_str(), ""],
            TagPolicy::Normalized { max_length: 100 },
        )
        .unwrap();

        assert_eq!(added, 2);
        assert_eq!(record.tags.len(), 2);
        assert_eq!(record.tags[1].chars().count(), 100);
        assert_eq!(revision.into_changes().tags.len(), 2);
    }

    #[test]
    fn test_apply_tags_verbatim_keeps_everything() {
        let catalog = MemoryCatalog::new();
        let mut revision = Revision::new(&catalog);
        let mut record = CatalogRecord::new("1", "abc");

        apply_tags(&mut revision, &mut record, ["health", "health", " spaced "], TagPolicy::Verbatim).unwrap();

        assert_eq!(record.tags, vec!["health", "health", " spaced "]);
        assert_eq!(revision.into_changes().tags.len(), 2);
    }
}
