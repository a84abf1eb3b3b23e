//! ddi-convert: convert harvested DDI documents into catalog records.
//!
//! Subcommands:
//! - `ddi-convert convert study.xml --url URL` commits the record into a JSON catalog
//! - `ddi-convert export-csv study.xml -o DIR` writes the variable tables only
//! - `ddi-convert inspect study.xml` prints the detected schema and identity

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use ddi_core::blob::DirBlobStore;
use ddi_core::document::Document;
use ddi_core::error::DdiError;
use ddi_core::options::ConverterOptions;
use ddi_core::pipeline::{HarvestInput, Pipeline, PipelineBuilder};
use ddi_core::record::{HarvestObject, SchemaVersion};
use ddi_core::store::{CatalogStore, MemoryCatalog};
use ddi_core::vocab::StaticVocabulary;
use ddi_input_codebook::fields::Codebook;
use ddi_input_codebook::CodebookConverter;
use ddi_input_lifecycle::LifecycleConverter;
use ddi_output_csv::export_data_description;
use ddi_utils::munge::munge_name;

/// Exit code for documents that cannot be identified as a record.
const EXIT_MALFORMED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "ddi-convert",
    version,
    about = "Convert DDI metadata into catalog records"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Public base URL of the catalog site
    #[arg(long, global = true)]
    site_url: Option<String>,

    /// Blob bucket for stored files
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Maximum tag length in characters
    #[arg(long, global = true)]
    tag_max_length: Option<usize>,

    /// Re-export stored files when an existing record is updated
    #[arg(long, global = true)]
    reexport_on_update: bool,

    /// Dump effective merged config as TOML and exit
    #[arg(long, global = true)]
    dump_config: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a document and commit the record into the catalog
    Convert {
        /// DDI XML file
        input: PathBuf,

        /// Source URL the document was harvested from
        #[arg(long)]
        url: Option<String>,

        /// JSON file holding the catalog
        #[arg(long, default_value = "catalog.json")]
        catalog: PathBuf,

        /// Directory for stored files
        #[arg(long, default_value = "blobs")]
        blob_dir: PathBuf,
    },

    /// Write the variable and category tables of a codebook
    ExportCsv {
        /// DDI-Codebook XML file
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the detected schema and study identity
    Inspect {
        /// DDI XML file
        input: PathBuf,
    },
}

/// Load config from global and project-local TOML files.
/// Keys in the project-local file override the global ones. Missing files are ignored.
fn load_config() -> ConverterOptions {
    let mut layers = Vec::new();

    // 1. Global config: ~/.config/ddi-convert/config.toml
    if let Some(config_dir) = dirs::config_dir() {
        layers.push(config_dir.join("ddi-convert").join("config.toml"));
    }

    // 2. Project-local config: ./.ddi-convert.toml
    layers.push(PathBuf::from(".ddi-convert.toml"));

    load_config_layers(&layers)
}

fn load_config_layers(paths: &[PathBuf]) -> ConverterOptions {
    let mut merged = toml::Table::new();
    for path in paths {
        if let Some(table) = read_config(path) {
            merge_config(&mut merged, table);
        }
    }
    match toml::Value::Table(merged).try_into::<ConverterOptions>() {
        Ok(opts) => opts,
        Err(e) => {
            log::warn!("Invalid merged config, using defaults: {}", e);
            ConverterOptions::default()
        }
    }
}

/// Parse one config file. A file that does not describe valid options is
/// skipped as a whole.
fn read_config(path: &Path) -> Option<toml::Table> {
    let contents = std::fs::read_to_string(path).ok()?;
    let checked = toml::from_str::<ConverterOptions>(&contents)
        .map_err(|e| e.to_string())
        .and_then(|_| contents.parse::<toml::Table>().map_err(|e| e.to_string()));
    match checked {
        Ok(table) => Some(table),
        Err(e) => {
            log::warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Merge `from` into `base` key by key. Nested tables (the vocabulary) are
/// merged recursively, any other value replaces the one in `base`.
fn merge_config(base: &mut toml::Table, from: toml::Table) {
    for (key, value) in from {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_config(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Apply CLI flags on top of config-loaded options.
fn apply_cli_overrides(opts: &mut ConverterOptions, cli: &Cli) {
    if let Some(ref site_url) = cli.site_url {
        opts.site_url = site_url.clone();
    }
    if let Some(ref bucket) = cli.bucket {
        opts.bucket = bucket.clone();
    }
    if let Some(max) = cli.tag_max_length {
        opts.tag_max_length = max.max(1);
    }
    if cli.reexport_on_update {
        opts.reexport_on_update = true;
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose > 0 { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut options = load_config();
    apply_cli_overrides(&mut options, &cli);

    if cli.dump_config {
        match toml::to_string_pretty(&options) {
            Ok(s) => {
                println!("{}", s);
                process::exit(0);
            }
            Err(e) => {
                eprintln!("Error serializing config: {}", e);
                process::exit(1);
            }
        }
    }

    let result = match cli.command {
        Some(Commands::Convert {
            input,
            url,
            catalog,
            blob_dir,
        }) => run_convert(&input, url.as_deref(), &catalog, &blob_dir, options),
        Some(Commands::ExportCsv { input, output }) => run_export_csv(&input, &output),
        Some(Commands::Inspect { input }) => run_inspect(&input),
        None => {
            eprintln!("Usage: ddi-convert convert <file> [--url URL] [--catalog FILE] [--blob-dir DIR]");
            eprintln!("   or: ddi-convert export-csv <file> -o <dir>");
            eprintln!("   or: ddi-convert inspect <file>");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        let malformed = e
            .downcast_ref::<DdiError>()
            .is_some_and(DdiError::is_malformed);
        process::exit(if malformed { EXIT_MALFORMED } else { 1 });
    }
}

fn read_document(path: &Path) -> Result<(Vec<u8>, Document)> {
    let raw = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let doc = Document::from_bytes(&raw)?;
    log::info!(
        "Parsed {} ({}, {})",
        path.display(),
        doc.schema().map(|s| s.to_string()).unwrap_or_else(|| "unknown schema".to_string()),
        doc.encoding()
    );
    Ok((raw, doc))
}

fn build_pipeline(options: ConverterOptions) -> Result<Pipeline> {
    let vocabulary = StaticVocabulary::new(options.vocabulary.clone());
    let pipeline = PipelineBuilder::new()
        .converter(Box::new(CodebookConverter))
        .converter(Box::new(LifecycleConverter))
        .options(options)
        .vocabulary(Box::new(vocabulary))
        .build()?;
    Ok(pipeline)
}

fn run_convert(
    input: &Path,
    url: Option<&str>,
    catalog_path: &Path,
    blob_dir: &Path,
    options: ConverterOptions,
) -> Result<()> {
    let (raw, doc) = read_document(input)?;
    let pipeline = build_pipeline(options)?;

    let mut catalog = MemoryCatalog::load(catalog_path)?;
    let mut blobs = DirBlobStore::new(blob_dir);
    let mut harvest = HarvestObject::with_content(String::from_utf8_lossy(&raw));
    let harvest_input = HarvestInput {
        document: &doc,
        source_url: url,
        raw: &raw,
    };

    let Some(record_id) = pipeline.run(&harvest_input, &mut catalog, &mut blobs, Some(&mut harvest))? else {
        bail!("Conversion of {} failed, see log for details", input.display());
    };

    catalog
        .save(catalog_path)
        .with_context(|| format!("Cannot write {}", catalog_path.display()))?;
    let record = catalog
        .record_by_id(&record_id)?
        .context("Committed record is missing from the catalog")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn run_export_csv(input: &Path, output: &Path) -> Result<()> {
    let (_, doc) = read_document(input)?;
    if doc.schema() != Some(SchemaVersion::Codebook) {
        bail!("{} is not a DDI-Codebook document", input.display());
    }

    let cb = Codebook::new(doc.root());
    let study_id = cb
        .study_id()
        .ok_or_else(|| DdiError::Malformed("codeBook has no study IDNo".to_string()))?;
    let name = munge_name(&study_id.value);
    let data_dscr = cb
        .data_description()
        .with_context(|| format!("{} has no dataDscr section", input.display()))?;

    let tables = export_data_description(data_dscr)?;
    std::fs::create_dir_all(output)?;
    let var_path = output.join(format!("{}_var.csv", name));
    let code_path = output.join(format!("{}_code.csv", name));
    std::fs::write(&var_path, &tables.variables)?;
    std::fs::write(&code_path, &tables.categories)?;

    log::info!(
        "Wrote {} variables to {} and {}",
        tables.variable_count,
        var_path.display(),
        code_path.display()
    );
    Ok(())
}

fn run_inspect(input: &Path) -> Result<()> {
    let (raw, doc) = read_document(input)?;
    let root = doc.root();

    println!("root:     {}", root.name());
    println!("encoding: {}", doc.encoding());
    println!("size:     {} bytes", raw.len());
    match doc.schema() {
        Some(SchemaVersion::Codebook) => {
            let cb = Codebook::new(root);
            println!("schema:   {}", SchemaVersion::Codebook);
            match cb.study_id() {
                Some(id) => {
                    println!("IDNo:     {}", id.qualified());
                    println!("name:     {}", munge_name(&id.value));
                }
                None => println!("IDNo:     <missing>"),
            }
            println!("title:    {}", cb.title().unwrap_or("<missing>"));
            println!("dataDscr: {}", cb.data_description().is_some());
        }
        Some(SchemaVersion::Lifecycle) => {
            let units: Vec<_> = root.find_all("StudyUnit").collect();
            println!("schema:   {}", SchemaVersion::Lifecycle);
            println!("instance: {}", root.attr("id").unwrap_or("<missing>"));
            println!("studies:  {}", units.len());
            if let Some(last) = units.last() {
                println!("name:     {}", last.attr("id").unwrap_or("<missing>"));
            }
        }
        None => println!("schema:   unsupported"),
    }
    Ok(())
}
