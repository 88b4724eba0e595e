use docload_observability::Counter;

pub struct IngestionMetrics {
    pub records: Counter<u64>,
    pub batches: Counter<u64>,
    pub skipped: Counter<u64>,
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        let meter = docload_observability::meter("ingestion");
        Self {
            records: meter
                .u64_counter("docload.ingest.records")
                .with_unit("{record}")
                .with_description("records acknowledged by the store")
                .build(),
            batches: meter
                .u64_counter("docload.ingest.batches")
                .with_unit("{call}")
                .with_description("write calls issued to the store")
                .build(),
            skipped: meter
                .u64_counter("docload.ingest.skipped")
                .with_unit("{record}")
                .with_description("records rejected by the store and skipped")
                .build(),
        }
    }
}
