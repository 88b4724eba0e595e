use bson::{Bson, Document};
use snafu::{Snafu, ensure};

/// A decoded document: an ordered mapping of field name to value.
pub type Record = Document;

/// Errors returned when validating field names used for headers or upsert keys.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum FieldNameError {
    #[snafu(display("field names can not be empty"))]
    EmptyField,
    #[snafu(display("field {field:?} can not start with a '.'"))]
    LeadingDot { field: String },
    #[snafu(display("field {field:?} can not end with a '.'"))]
    TrailingDot { field: String },
    #[snafu(display("field {field:?} can not start with a '$'"))]
    DollarPrefix { field: String },
    #[snafu(display("field {field:?} can not contain consecutive '.' characters"))]
    ConsecutiveDots { field: String },
    #[snafu(display("fields can not be identical: {field:?}"))]
    Duplicate { field: String },
    #[snafu(display("incompatible fields found: {field:?} and {other:?}"))]
    Incompatible { field: String, other: String },
}

/// Looks up a possibly dotted field path (`a.b.c`) in a record.
///
/// Returns `None` if any segment is missing or traverses a non-document value.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;

    for segment in segments {
        match current {
            Bson::Document(doc) => current = doc.get(segment)?,
            _ => return None,
        }
    }

    Some(current)
}

/// Validates a list of field names.
///
/// Besides checking each name, rejects duplicated names and any pair where one
/// field is a dotted prefix of the other (`a` and `a.b`), since the two could
/// not both be set on the same document.
pub fn validate_field_names<S: AsRef<str>>(fields: &[S]) -> Result<(), FieldNameError> {
    let mut sorted: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    for (index, field) in sorted.iter().enumerate() {
        ensure!(!field.is_empty(), EmptyFieldSnafu);
        ensure!(!field.starts_with('.'), LeadingDotSnafu { field: *field });
        ensure!(!field.ends_with('.'), TrailingDotSnafu { field: *field });
        ensure!(!field.starts_with('$'), DollarPrefixSnafu { field: *field });
        ensure!(!field.contains(".."), ConsecutiveDotsSnafu { field: *field });

        let prefix = format!("{field}.");
        for other in &sorted[index + 1..] {
            ensure!(other != field, DuplicateSnafu { field: *field });
            ensure!(
                !other.starts_with(&prefix),
                IncompatibleSnafu {
                    field: *field,
                    other: *other,
                }
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn test_get_path() {
        let record = doc! { "a": 1, "b": { "c": { "d": "deep" } }, "e": [1, 2] };

        assert_eq!(get_path(&record, "a"), Some(&Bson::Int32(1)));
        assert_eq!(
            get_path(&record, "b.c.d"),
            Some(&Bson::String("deep".to_string()))
        );
        assert_eq!(get_path(&record, "b.x"), None);
        assert_eq!(get_path(&record, "a.b"), None);
        assert_eq!(get_path(&record, "e.0"), None);
    }

    #[test]
    fn test_validate_field_names() {
        assert!(validate_field_names(&["a", "b.c", "b.d"]).is_ok());
        assert_eq!(
            validate_field_names(&["a", ""]),
            Err(FieldNameError::EmptyField)
        );
        assert!(matches!(
            validate_field_names(&[".a"]),
            Err(FieldNameError::LeadingDot { .. })
        ));
        assert!(matches!(
            validate_field_names(&["a."]),
            Err(FieldNameError::TrailingDot { .. })
        ));
        assert!(matches!(
            validate_field_names(&["$a"]),
            Err(FieldNameError::DollarPrefix { .. })
        ));
        assert!(matches!(
            validate_field_names(&["a..b"]),
            Err(FieldNameError::ConsecutiveDots { .. })
        ));
        assert!(matches!(
            validate_field_names(&["a", "b", "a"]),
            Err(FieldNameError::Duplicate { .. })
        ));
        assert_eq!(
            validate_field_names(&["a.b", "a"]),
            Err(FieldNameError::Incompatible {
                field: "a".to_string(),
                other: "a.b".to_string(),
            })
        );
        // "ab" is not a dotted child of "a"
        assert!(validate_field_names(&["a", "ab"]).is_ok());
    }
}
