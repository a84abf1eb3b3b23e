//! Tabular export of a codebook's data description.
//!
//! Every `var` element yields one row in the variable table and one row per
//! category code in the code table. Both tables are plain CSV with a literal
//! header row.

pub mod rows;

use std::fmt::Display;

use csv::{Terminator, Writer, WriterBuilder};

use ddi_core::document::Element;
use ddi_core::error::{DdiError, Result};

pub use rows::{category_rows, variable_key, variable_row, CategoryRow, VariableRow};

/// Column order of the variable metadata table.
pub const VARIABLE_COLUMNS: [&str; 18] = [
    "ID",
    "labl",
    "preQTxt",
    "qstnLit",
    "postQTxt",
    "ivuInstr",
    "varFormat",
    "TotlResp",
    "range",
    "item",
    "sumStat_vald",
    "sumStat_invd",
    "sumStat_min",
    "sumStat_max",
    "sumStat_mean",
    "sumStat_stdev",
    "notes",
    "txt",
];

/// Column order of the category code table.
pub const CATEGORY_COLUMNS: [&str; 4] = ["ID", "catValu", "labl", "catStat"];

/// Both tables of one data description, plus the per-variable labels that
/// feed the record's search text.
#[derive(Debug, Clone, Default)]
pub struct TabularExport {
    pub variables: Vec<u8>,
    pub categories: Vec<u8>,
    pub labels: Vec<String>,
    pub variable_count: usize,
}

fn table_error(e: impl Display) -> DdiError {
    DdiError::Io(std::io::Error::other(format!("Failed to import DDI to CSV: {}", e)))
}

fn table_writer(columns: &[&str]) -> Result<Writer<Vec<u8>>> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(columns).map_err(table_error)?;
    Ok(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer.into_inner().map_err(table_error)
}

/// Export every `var` under `data_dscr` (at any depth) into the two tables.
///
/// A row that cannot be written fails the whole export.
pub fn export_data_description(data_dscr: &Element) -> Result<TabularExport> {
    let mut variables = table_writer(&VARIABLE_COLUMNS)?;
    let mut categories = table_writer(&CATEGORY_COLUMNS)?;
    let mut labels = Vec::new();
    let mut variable_count = 0;

    for var in data_dscr.find_all("var") {
        let row = variable_row(var);
        variables
            .write_record(row.cells(&VARIABLE_COLUMNS))
            .map_err(table_error)?;
        for category in category_rows(var) {
            categories
                .write_record(category.cells())
                .map_err(table_error)?;
        }
        if let Some(label) = row.label() {
            labels.push(label.to_string());
        }
        variable_count += 1;
    }

    log::info!("Exported {} variables to CSV", variable_count);
    Ok(TabularExport {
        variables: finish(variables)?,
        categories: finish(categories)?,
        labels,
        variable_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_core::document::Document;

    const DATA_DSCR: &str = r#"<dataDscr>
  <varGrp ID="G1"/>
  <var ID="V1" name="gender">
    <labl level="variable">Gender</labl>
    <sumStat type="mean">1.45</sumStat>
    <sumStat type="stdev">0.5</sumStat>
    <catgry><catValu>1</catValu><labl level="category">Male</labl><catStat>60</catStat></catgry>
    <catgry><catValu>2</catValu><labl level="category">Female</labl><catStat>55</catStat></catgry>
    <catgry><catValu>9</catValu><labl level="category">No answer, refused</labl></catgry>
  </var>
  <var name="age">
    <qstn><qstnLit>How old are you?</qstnLit></qstn>
    <valrng><range min="15" max="99"/></valrng>
    <location StartPos="3"/>
  </var>
</dataDscr>"#;

    fn read_table(bytes: &[u8]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (headers, rows)
    }

    #[test]
    fn test_export_variable_table() {
        let doc = Document::parse_str(DATA_DSCR).unwrap();
        let export = export_data_description(doc.root()).unwrap();
        assert_eq!(export.variable_count, 2);

        let (headers, rows) = read_table(&export.variables);
        assert_eq!(headers, VARIABLE_COLUMNS.to_vec());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 18));

        let col = |name: &str| VARIABLE_COLUMNS.iter().position(|c| *c == name).unwrap();
        assert_eq!(rows[0][col("ID")], "V1");
        assert_eq!(rows[0][col("labl")], "Gender");
        assert_eq!(rows[0][col("sumStat_mean")], "1.45");
        assert_eq!(rows[0][col("sumStat_stdev")], "0.5");
        assert_eq!(rows[0][col("sumStat_vald")], "");
        assert_eq!(rows[1][col("ID")], "age");
        assert_eq!(rows[1][col("qstnLit")], "How old are you?");
        assert_eq!(rows[1][col("range")], "(min,15)(max,99)");
    }

    #[test]
    fn test_export_code_table() {
        let doc = Document::parse_str(DATA_DSCR).unwrap();
        let export = export_data_description(doc.root()).unwrap();

        let (headers, rows) = read_table(&export.categories);
        assert_eq!(headers, CATEGORY_COLUMNS.to_vec());
        assert_eq!(
            rows,
            vec![
                vec!["V1", "1", "Male", "60"],
                vec!["V1", "2", "Female", "55"],
                vec!["V1", "9", "No answer, refused", ""],
            ]
        );
    }

    #[test]
    fn test_export_labels_fall_back_to_question() {
        let doc = Document::parse_str(DATA_DSCR).unwrap();
        let export = export_data_description(doc.root()).unwrap();
        assert_eq!(export.labels, vec!["Gender", "How old are you?"]);
    }

    #[test]
    fn test_export_empty_data_description() {
        let doc = Document::parse_str("<dataDscr/>").unwrap();
        let export = export_data_description(doc.root()).unwrap();
        assert_eq!(export.variable_count, 0);
        assert!(export.labels.is_empty());
        let (headers, rows) = read_table(&export.categories);
        assert_eq!(headers.len(), 4);
        assert!(rows.is_empty());
    }
}
