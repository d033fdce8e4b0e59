//! Consumers of started migrations.

use std::fs::File;
use std::io::Write;

use crate::core::migration::MigrationRecord;

/// Receives a record for every started migration.
pub trait MigrationSink {
    fn record(&mut self, record: MigrationRecord);
}

/// Keeps migration records in memory.
#[derive(Default)]
pub struct MigrationLog {
    records: Vec<MigrationRecord>,
}

impl MigrationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MigrationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes all records to a CSV file.
    pub fn save_csv(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl MigrationSink for MigrationLog {
    fn record(&mut self, record: MigrationRecord) {
        self.records.push(record);
    }
}

/// Streams migration records as CSV rows.
pub struct CsvMigrationWriter<W: Write> {
    writer: csv::Writer<W>,
    failed: usize,
}

impl<W: Write> CsvMigrationWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            failed: 0,
        }
    }

    /// Returns the number of records that could not be written.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Flushes buffered rows and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, std::io::Error> {
        self.writer
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.error().to_string()))
    }
}

impl CsvMigrationWriter<File> {
    pub fn create(path: &str) -> Result<Self, std::io::Error> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> MigrationSink for CsvMigrationWriter<W> {
    fn record(&mut self, record: MigrationRecord) {
        if let Err(e) = self.writer.serialize(&record) {
            log::error!("failed to write migration record: {}", e);
            self.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vm_id: u32) -> MigrationRecord {
        MigrationRecord {
            time: 12.5,
            simulation_id: 7,
            datacenter: "dc".to_string(),
            vm_id,
            source_host: 0,
            target_host: 1,
            reason: "consolidate".to_string(),
            source_cpu_utilization: 0.1,
            source_ram_utilization: 0.05,
            source_power: 0.75,
            target_cpu_utilization: 0.5,
            target_ram_utilization: 0.4,
            target_power: 0.85,
        }
    }

    #[test]
    fn csv_writer_emits_header_and_rows() {
        let mut sink = CsvMigrationWriter::new(Vec::new());
        sink.record(record(3));
        sink.record(record(4));
        assert_eq!(sink.failed(), 0);
        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time,simulation_id,datacenter,vm_id,source_host,target_host,reason"));
        assert!(lines[1].starts_with("12.5,7,dc,3,0,1,consolidate,"));
    }

    #[test]
    fn in_memory_log() {
        let mut log = MigrationLog::new();
        assert!(log.is_empty());
        log.record(record(1));
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].vm_id, 1);
    }
}
