use docload_store_core::{Namespace, Record, bson::doc};

pub fn namespace() -> Namespace {
    Namespace::new("test", "ingest").expect("valid namespace")
}

/// Generate records with sequential `_id`s and a fixed serialized size.
pub fn numbered_records(count: usize) -> Vec<Record> {
    (0..count as i32)
        .map(|id| doc! { "_id": id, "name": format!("record-{id:06}") })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_records_have_equal_size() {
        let sizes: Vec<usize> = numbered_records(20)
            .iter()
            .map(|record| {
                let mut buf = Vec::new();
                record.to_writer(&mut buf).unwrap();
                buf.len()
            })
            .collect();

        assert_eq!(sizes.len(), 20);
        assert!(sizes.iter().all(|&size| size == sizes[0]));
    }
}
