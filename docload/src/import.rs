use std::{
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Args, ValueEnum};
use docload_ingest_core::{DEFAULT_BULK_BUFFER_SIZE, IngestOptions, Importer};
use docload_source::{
    CsvOptions, CsvSource, Delimiter, JsonOptions, JsonSource, RecordSource, parse_field_list,
    read_field_file,
};
use docload_store_core::{Namespace, SessionProvider};
use docload_store_memory::InMemoryStore;
use docload_store_mongo::MongoProvider;
use snafu::{ResultExt, ensure};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{
    ImportSnafu, InvalidArgumentSnafu, InvalidNamespaceSnafu, Result, SourceSnafu, StoreSnafu,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputType {
    Json,
    Csv,
    Tsv,
}

/// Import records into a collection
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Connection string of the target deployment
    #[arg(long, default_value = "mongodb://localhost:27017")]
    uri: String,

    /// Database to import into
    #[arg(long, short = 'd', default_value = "test")]
    db: String,

    /// Collection to import into. Defaults to the input file name without its extension
    #[arg(long, short = 'c')]
    collection: Option<String>,

    /// File to import. Reads stdin when no file is given
    #[arg(long)]
    file: Option<PathBuf>,

    /// File to import, same as --file
    #[arg(value_name = "FILE")]
    file_arg: Option<PathBuf>,

    /// Input format
    #[arg(long = "type", value_enum, default_value_t = InputType::Json)]
    input_type: InputType,

    /// Use the first line of CSV or TSV input as field names
    #[arg(long)]
    header_line: bool,

    /// Comma separated field names for CSV or TSV input
    #[arg(long, short = 'f')]
    fields: Option<String>,

    /// File with one field name per line for CSV or TSV input
    #[arg(long)]
    field_file: Option<PathBuf>,

    /// Treat the JSON input as a single array of documents
    #[arg(long)]
    json_array: bool,

    /// Drop fields with empty values from CSV or TSV records
    #[arg(long)]
    ignore_blanks: bool,

    /// Drop the collection before importing
    #[arg(long)]
    drop: bool,

    /// Replace existing records instead of inserting duplicates
    #[arg(long)]
    upsert: bool,

    /// Comma separated fields matching the record to replace. Implies --upsert
    #[arg(long)]
    upsert_fields: Option<String>,

    /// Stop at the first rejected record
    #[arg(long)]
    stop_on_error: bool,

    /// Write records in input order, with a single insertion worker
    #[arg(long)]
    maintain_insertion_order: bool,

    /// Number of concurrent insertion workers
    #[arg(long, short = 'j', default_value_t = 1)]
    num_insertion_workers: usize,

    /// Records per write call
    #[arg(long, default_value_t = DEFAULT_BULK_BUFFER_SIZE)]
    batch_size: usize,

    /// Write concern, as a mode name or a JSON document such as {"w": 2, "j": true}
    #[arg(long, default_value = "majority")]
    write_concern: String,

    /// Keep writing the rest of a batch after a record is rejected
    #[arg(long)]
    unordered: bool,

    /// Import into an in-memory store instead of a deployment
    #[arg(long)]
    dry_run: bool,
}

impl ImportArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        self.validate()?;

        let namespace =
            Namespace::new(self.db.clone(), self.collection_name()?).context(InvalidNamespaceSnafu)?;

        let provider: Arc<dyn SessionProvider> = if self.dry_run {
            info!("dry run, records are written to an in-memory store");
            Arc::new(InMemoryStore::new())
        } else {
            Arc::new(MongoProvider::new(&self.uri).await.context(StoreSnafu)?)
        };

        let importer =
            Importer::new(provider, namespace, self.ingest_options()).context(ImportSnafu)?;
        let source = self.record_source()?;

        let result = importer.run(source, ct.clone()).await;

        if ct.is_cancelled() {
            warn!("import interrupted");
        }

        println!("imported {} documents", result.inserted);

        result.into_result().context(ImportSnafu)?;

        Ok(())
    }

    fn input_file(&self) -> Option<&Path> {
        self.file.as_deref().or(self.file_arg.as_deref())
    }

    fn is_delimited(&self) -> bool {
        matches!(self.input_type, InputType::Csv | InputType::Tsv)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.file.is_none() || self.file_arg.is_none(),
            InvalidArgumentSnafu {
                name: "file",
                message: "give the input file either with --file or as an argument, not both",
            }
        );
        ensure!(
            self.fields.is_none() || self.field_file.is_none(),
            InvalidArgumentSnafu {
                name: "fields",
                message: "--fields and --field-file cannot be used together",
            }
        );

        let has_fields = self.fields.is_some() || self.field_file.is_some();

        if self.is_delimited() {
            ensure!(
                !(self.header_line && has_fields),
                InvalidArgumentSnafu {
                    name: "header-line",
                    message: "--header-line cannot be used with --fields or --field-file",
                }
            );
            ensure!(
                self.header_line || has_fields,
                InvalidArgumentSnafu {
                    name: "fields",
                    message: "CSV and TSV input need --header-line, --fields or --field-file",
                }
            );
            ensure!(
                !self.json_array,
                InvalidArgumentSnafu {
                    name: "json-array",
                    message: "--json-array is only valid for JSON input",
                }
            );
        } else {
            ensure!(
                !self.header_line && !has_fields,
                InvalidArgumentSnafu {
                    name: "fields",
                    message: "field names cannot be given for JSON input",
                }
            );
            ensure!(
                !self.ignore_blanks,
                InvalidArgumentSnafu {
                    name: "ignore-blanks",
                    message: "--ignore-blanks is only valid for CSV and TSV input",
                }
            );
        }

        Ok(())
    }

    fn collection_name(&self) -> Result<String> {
        if let Some(collection) = &self.collection {
            return Ok(collection.clone());
        }

        self.input_file()
            .and_then(Path::file_stem)
            .and_then(|stem| stem.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                InvalidArgumentSnafu {
                    name: "collection",
                    message: "no collection given and none can be taken from the input file name",
                }
                .build()
            })
    }

    fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            num_insertion_workers: self.num_insertion_workers,
            bulk_buffer_size: self.batch_size,
            maintain_insertion_order: self.maintain_insertion_order,
            upsert: self.upsert,
            upsert_fields: self
                .upsert_fields
                .as_deref()
                .map(parse_field_list)
                .unwrap_or_default(),
            stop_on_error: self.stop_on_error,
            write_concern: self.write_concern.clone(),
            unordered: self.unordered,
            ignore_blanks: self.ignore_blanks,
            drop: self.drop,
        }
    }

    fn field_names(&self) -> Result<Vec<String>> {
        if let Some(fields) = &self.fields {
            return Ok(parse_field_list(fields));
        }

        match &self.field_file {
            Some(path) => read_field_file(path).context(SourceSnafu),
            None => Ok(Vec::new()),
        }
    }

    fn record_source(&self) -> Result<Box<dyn RecordSource>> {
        let input = self.input_file();

        let source: Box<dyn RecordSource> = match self.input_type {
            InputType::Json => {
                let options = JsonOptions {
                    json_array: self.json_array,
                };

                match input {
                    Some(path) => Box::new(JsonSource::open(path, options).context(SourceSnafu)?),
                    None => Box::new(JsonSource::new(BufReader::new(io::stdin()), options)),
                }
            }
            InputType::Csv | InputType::Tsv => {
                let options = CsvOptions {
                    delimiter: if self.input_type == InputType::Tsv {
                        Delimiter::Tab
                    } else {
                        Delimiter::Comma
                    },
                    header_line: self.header_line,
                    fields: self.field_names()?,
                };

                let source = match input {
                    Some(path) => CsvSource::open(path, options),
                    None => CsvSource::new(BufReader::new(io::stdin()), options),
                };
                Box::new(source.context(SourceSnafu)?)
            }
        };

        Ok(source)
    }
}
