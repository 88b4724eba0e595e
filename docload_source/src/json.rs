use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use async_trait::async_trait;
use bytesize::ByteSize;
use docload_store_core::{Record, bson::Bson};
use serde_json::Value;
use snafu::{ResultExt, ensure};

use crate::{
    RecordSource,
    decoder::{BlockingDecoder, DecoderSink},
    error::{
        ArrayTooLargeSnafu, ExtendedJsonSnafu, IoSnafu, JsonSnafu, NotADocumentSnafu,
        NotAnArraySnafu, OpenSnafu, Result,
    },
};

/// Largest JSON array input accepted, matching the store's document size limit.
pub const MAX_JSON_ARRAY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct JsonOptions {
    /// Input is a single top-level array of documents.
    pub json_array: bool,
}

/// Decodes JSON documents, one after the other or as a single array.
///
/// Values are read as extended JSON, so `{"$oid": ...}`, `{"$date": ...}` and
/// friends become their BSON types.
pub struct JsonSource {
    decoder: BlockingDecoder,
}

impl JsonSource {
    pub fn new<R>(reader: R, options: JsonOptions) -> Self
    where
        R: Read + Send + 'static,
    {
        let decoder = BlockingDecoder::new(move |sink| {
            if options.json_array {
                decode_array(reader, sink)
            } else {
                decode_stream(reader, sink)
            }
        });

        Self { decoder }
    }

    pub fn open(path: impl AsRef<Path>, options: JsonOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context(OpenSnafu { path })?;
        Ok(Self::new(BufReader::new(file), options))
    }
}

#[async_trait]
impl RecordSource for JsonSource {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        self.decoder.next().await
    }
}

fn decode_stream<R: Read>(reader: R, sink: &DecoderSink) -> Result<()> {
    let values = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();

    for (index, value) in values.enumerate() {
        let record = index as u64 + 1;
        let value = value.context(JsonSnafu { record })?;

        if !sink.emit(to_record(value, record)?) {
            break;
        }
    }

    Ok(())
}

fn decode_array<R: Read>(reader: R, sink: &DecoderSink) -> Result<()> {
    let mut buf = Vec::new();
    reader
        .take(MAX_JSON_ARRAY_BYTES + 1)
        .read_to_end(&mut buf)
        .context(IoSnafu)?;

    ensure!(
        buf.len() as u64 <= MAX_JSON_ARRAY_BYTES,
        ArrayTooLargeSnafu {
            limit: ByteSize::b(MAX_JSON_ARRAY_BYTES),
        }
    );

    let value: Value = serde_json::from_slice(&buf).context(JsonSnafu { record: 1u64 })?;
    let Value::Array(values) = value else {
        return NotAnArraySnafu.fail();
    };

    for (index, value) in values.into_iter().enumerate() {
        if !sink.emit(to_record(value, index as u64 + 1)?) {
            break;
        }
    }

    Ok(())
}

fn to_record(value: Value, record: u64) -> Result<Record> {
    let found = match &value {
        Value::Object(_) => "an object",
        Value::Array(_) => "an array",
        Value::String(_) => "a string",
        Value::Number(_) => "a number",
        Value::Bool(_) => "a boolean",
        Value::Null => "null",
    };

    ensure!(value.is_object(), NotADocumentSnafu { record, found });

    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        // a top-level extended JSON value such as {"$oid": ...}
        Ok(_) => NotADocumentSnafu {
            record,
            found: "an extended JSON value",
        }
        .fail(),
        Err(err) => ExtendedJsonSnafu {
            record,
            message: err.to_string(),
        }
        .fail(),
    }
}
