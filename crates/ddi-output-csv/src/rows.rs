//! Row builders for a single `var` element.

use std::collections::BTreeMap;

use ddi_core::document::Element;
use ddi_utils::xml::collect_attribs;

/// Children of `var` that never become a column of their own.
const SKIPPED_CHILDREN: [&str; 4] = ["catgry", "catgrp", "catValu", "catStat"];

/// Question sub-fields lifted out of `qstn`.
const QUESTION_FIELDS: [&str; 4] = ["preQTxt", "qstnLit", "postQTxt", "ivuInstr"];

/// Row key of a variable: its `ID` attribute, else its `name` attribute.
pub fn variable_key(var: &Element) -> Option<&str> {
    var.attr("ID").or_else(|| var.attr("name"))
}

/// Flattened metadata of one variable, keyed by column name.
///
/// A key may be present with no value (`None`); both render as an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableRow {
    fields: BTreeMap<String, Option<String>>,
}

impl VariableRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The variable's label, or its question literal when it has none.
    pub fn label(&self) -> Option<&str> {
        self.get("labl")
            .filter(|l| !l.is_empty())
            .or_else(|| self.get("qstnLit").filter(|q| !q.is_empty()))
    }

    /// Cells in `columns` order; keys not named there are dropped.
    pub fn cells(&self, columns: &[&str]) -> Vec<String> {
        for key in self.keys().filter(|k| !columns.contains(k)) {
            log::debug!("Dropping column {:?} of variable {:?}", key, self.get("ID"));
        }
        columns
            .iter()
            .map(|c| self.get(c).unwrap_or_default().to_string())
            .collect()
    }

    fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        self.fields.insert(key.into(), value);
    }
}

fn trimmed(el: &Element) -> Option<String> {
    el.string().map(|s| s.trim().to_string())
}

/// Build the metadata row of one `var` element from its direct children.
///
/// Later children overwrite earlier ones with the same key.
pub fn variable_row(var: &Element) -> VariableRow {
    let mut row = VariableRow::default();
    row.set("ID", variable_key(var).map(str::to_string));

    for child in var.element_children() {
        let name = child.name();
        if SKIPPED_CHILDREN.contains(&name) {
            continue;
        }
        match name {
            "qstn" => {
                for field in QUESTION_FIELDS {
                    if let Some(el) = child.find(field) {
                        row.set(field, trimmed(el));
                    }
                }
            }
            "sumStat" => {
                // Several sumStat siblings are told apart by their type.
                let key = match child.non_empty_attr("type") {
                    Some(kind) => format!("sumStat_{}", kind),
                    None => "sumStat".to_string(),
                };
                row.set(key, trimmed(child));
            }
            "valrng" => {
                if let Some(range) = child.find("range") {
                    row.set("range", Some(collect_attribs(range.attributes())));
                }
            }
            "invalrng" => {
                if let Some(item) = child.find("item") {
                    row.set("item", Some(collect_attribs(item.attributes())));
                }
            }
            "labl" if child.attr("level").is_some() => {
                if child.attr("level") == Some("variable") {
                    if let Some(text) = trimmed(child) {
                        row.set("labl", Some(text));
                    }
                }
            }
            _ => row.set(name, trimmed(child)),
        }
    }
    row
}

/// One category code of a variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: Option<String>,
    pub value: Option<String>,
    pub label: Option<String>,
    pub statistic: Option<String>,
}

impl CategoryRow {
    pub fn cells(&self) -> [&str; 4] {
        [
            self.id.as_deref().unwrap_or_default(),
            self.value.as_deref().unwrap_or_default(),
            self.label.as_deref().unwrap_or_default(),
            self.statistic.as_deref().unwrap_or_default(),
        ]
    }
}

/// One row per direct `catgry` child of `var`.
pub fn category_rows(var: &Element) -> Vec<CategoryRow> {
    let id = variable_key(var).map(str::to_string);
    var.children_named("catgry")
        .map(|cat| CategoryRow {
            id: id.clone(),
            value: cat.find("catValu").and_then(trimmed),
            label: cat.find("labl").and_then(trimmed),
            statistic: cat.find("catStat").and_then(trimmed),
        })
        .collect()
}
