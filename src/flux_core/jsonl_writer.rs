//! JSONL writer for flux summaries - one JSON object per window

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use super::summary::OutputRecord;
use super::writer_backend::{SummaryWriterBackend, SummaryWriterError};

pub struct JsonlSummaryWriter {
    writer: BufWriter<std::fs::File>,
}

impl JsonlSummaryWriter {
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        log::info!("📝 Writing flux summaries to: {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl SummaryWriterBackend for JsonlSummaryWriter {
    fn write_record(&mut self, record: &OutputRecord) -> Result<(), SummaryWriterError> {
        let json = serde_json::to_string(&record.to_json())?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SummaryWriterError> {
        self.writer.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

impl Drop for JsonlSummaryWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
