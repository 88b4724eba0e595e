use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::Path,
};

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord};
use docload_store_core::{
    Record,
    bson::{Bson, Document},
    validate_field_names,
};
use snafu::{ResultExt, ensure};

use crate::{
    RecordSource,
    decoder::{BlockingDecoder, DecoderSink},
    error::{CsvSnafu, InvalidFieldsSnafu, MissingFieldsSnafu, OpenSnafu, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delimiter {
    #[default]
    Comma,
    /// Tab separated values. Quotes have no special meaning.
    Tab,
}

#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    pub delimiter: Delimiter,
    /// Take the field names from the first line of input.
    pub header_line: bool,
    /// Field names, used when there is no header line.
    pub fields: Vec<String>,
}

/// Decodes comma or tab separated rows into records.
///
/// Columns past the known field names are stored as `field<N>`, where `N` is
/// the zero based column index. Dotted field names create nested documents.
pub struct CsvSource {
    decoder: BlockingDecoder,
}

impl CsvSource {
    pub fn new<R>(reader: R, options: CsvOptions) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        if !options.header_line {
            ensure!(!options.fields.is_empty(), MissingFieldsSnafu);
            validate_field_names(&options.fields).context(InvalidFieldsSnafu)?;
        }

        let decoder = BlockingDecoder::new(move |sink| decode(reader, options, sink));

        Ok(Self { decoder })
    }

    pub fn open(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(OpenSnafu { path })?;
        Self::new(BufReader::new(file), options)
    }
}

#[async_trait]
impl RecordSource for CsvSource {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        self.decoder.next().await
    }
}

/// Split a comma separated list of field names.
pub fn parse_field_list(list: &str) -> Vec<String> {
    list.split(',').map(|field| field.trim().to_string()).collect()
}

/// Read field names from a file, one per line. Blank lines are skipped.
pub fn read_field_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).context(OpenSnafu { path })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn decode<R: Read>(reader: R, options: CsvOptions, sink: &DecoderSink) -> Result<()> {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true);

    if options.delimiter == Delimiter::Tab {
        builder.delimiter(b'\t').quoting(false);
    }

    let mut rows = builder.from_reader(reader).into_records();

    let fields = if options.header_line {
        let Some(header) = rows.next() else {
            return Ok(());
        };
        // the header line is record 0
        let header = header.context(CsvSnafu { record: 0u64 })?;
        let fields: Vec<String> = header.iter().map(|name| name.trim().to_string()).collect();
        validate_field_names(&fields).context(InvalidFieldsSnafu)?;
        fields
    } else {
        options.fields
    };

    for (index, row) in rows.enumerate() {
        let row = row.context(CsvSnafu {
            record: index as u64 + 1,
        })?;

        if !sink.emit(to_record(&fields, &row)) {
            break;
        }
    }

    Ok(())
}

fn to_record(fields: &[String], row: &StringRecord) -> Record {
    let mut record = Record::new();

    for (index, value) in row.iter().enumerate() {
        let value = auto_type(value);
        match fields.get(index) {
            Some(name) => set_nested(&mut record, name, value),
            None => {
                record.insert(format!("field{index}"), value);
            }
        }
    }

    record
}

/// Parse a cell as a 32 bit integer, a 64 bit integer or a float, falling back to a string.
fn auto_type(value: &str) -> Bson {
    if let Ok(n) = value.parse::<i32>() {
        return Bson::Int32(n);
    }

    if let Ok(n) = value.parse::<i64>() {
        return Bson::Int64(n);
    }

    // f64 parsing accepts "inf" and "NaN", which should stay strings
    if value.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(n) = value.parse::<f64>() {
            return Bson::Double(n);
        }
    }

    Bson::String(value.to_string())
}

fn set_nested(doc: &mut Document, path: &str, value: Bson) {
    let Some((head, rest)) = path.split_once('.') else {
        doc.insert(path, value);
        return;
    };

    if !matches!(doc.get(head), Some(Bson::Document(_))) {
        doc.insert(head, Document::new());
    }

    if let Some(Bson::Document(child)) = doc.get_mut(head) {
        set_nested(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use docload_store_core::{FieldNameError, bson::doc};

    use super::*;
    use crate::error::SourceError;

    fn source(input: &str, options: CsvOptions) -> CsvSource {
        CsvSource::new(Cursor::new(input.to_string()), options).unwrap()
    }

    async fn collect(source: &mut CsvSource) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = source.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    fn header_line() -> CsvOptions {
        CsvOptions {
            header_line: true,
            ..CsvOptions::default()
        }
    }

    #[tokio::test]
    async fn test_header_line_and_types() {
        let mut source = source(
            "name, age, score, big\nalice,30,1.5,5000000000\nbob,x,,7\n",
            header_line(),
        );
        let records = collect(&mut source).await.unwrap();

        assert_eq!(
            records,
            vec![
                doc! { "name": "alice", "age": 30, "score": 1.5, "big": 5_000_000_000i64 },
                doc! { "name": "bob", "age": "x", "score": "", "big": 7 },
            ]
        );
    }

    #[tokio::test]
    async fn test_explicit_fields_and_extra_columns() {
        let options = CsvOptions {
            fields: vec!["a".to_string(), "b.c".to_string(), "b.d".to_string()],
            ..CsvOptions::default()
        };
        let mut source = source("1,2,3,4\n", options);
        let records = collect(&mut source).await.unwrap();

        assert_eq!(
            records[0],
            doc! { "a": 1, "b": { "c": 2, "d": 3 }, "field3": 4 }
        );
    }

    #[tokio::test]
    async fn test_tab_separated_ignores_quotes() {
        let options = CsvOptions {
            delimiter: Delimiter::Tab,
            ..header_line()
        };
        let mut source = source("a\tb\n\"quoted\tx\n", options);
        let records = collect(&mut source).await.unwrap();

        assert_eq!(records[0], doc! { "a": "\"quoted", "b": "x" });
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected() {
        let mut source = source("a,a.b\n1,2\n", header_line());

        assert!(matches!(
            source.next_record().await,
            Err(SourceError::InvalidFields {
                source: FieldNameError::Incompatible { .. }
            })
        ));
    }

    #[test]
    fn test_missing_fields() {
        let result = CsvSource::new(Cursor::new(Vec::new()), CsvOptions::default());
        assert!(matches!(result, Err(SourceError::MissingFields)));
    }

    #[test]
    fn test_auto_type() {
        assert_eq!(auto_type("12"), Bson::Int32(12));
        assert_eq!(auto_type("-3000000000"), Bson::Int64(-3_000_000_000));
        assert_eq!(auto_type("2.5e3"), Bson::Double(2500.0));
        assert_eq!(auto_type("NaN"), Bson::String("NaN".to_string()));
        assert_eq!(auto_type("inf"), Bson::String("inf".to_string()));
        assert_eq!(auto_type(""), Bson::String(String::new()));
    }

    #[test]
    fn test_field_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a\n\n b.c \n").unwrap();

        assert_eq!(read_field_file(file.path()).unwrap(), ["a", "b.c"]);
        assert_eq!(parse_field_list("a, b ,c"), ["a", "b", "c"]);
    }
}
