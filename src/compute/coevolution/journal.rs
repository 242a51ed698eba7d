//! Line-oriented run journals.

use std::io::{self, Write};

use crate::compute::baldwin::HistoryEntry;

/// Log of predictor archive insertions and length changes.
pub struct PredictorJournal {
    writer: Box<dyn Write + Send>,
}

impl PredictorJournal {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    /// `Generation <g>: Predictor phenotype length <n> [ <indices> ]`
    pub fn record(&mut self, generation: u64, phenotype: &[u32]) -> io::Result<()> {
        write!(
            self.writer,
            "Generation {generation}: Predictor phenotype length {} [",
            phenotype.len()
        )?;
        for index in phenotype {
            write!(self.writer, " {index}")?;
        }
        writeln!(self.writer, " ]")?;
        self.writer.flush()
    }
}

/// Log of Baldwin history entries, one JSON object per line.
pub struct HistoryJournal {
    writer: Box<dyn Write + Send>,
}

impl HistoryJournal {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    pub fn record(&mut self, entry: &HistoryEntry) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        writeln!(self.writer)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Writer whose contents stay readable after the journal takes it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_predictor_line_format() {
        let buffer = SharedBuffer::default();
        let mut journal = PredictorJournal::new(buffer.clone());
        journal.record(17, &[4, 0, 9]).unwrap();
        journal.record(18, &[]).unwrap();

        assert_eq!(
            buffer.text(),
            "Generation 17: Predictor phenotype length 3 [ 4 0 9 ]\n\
             Generation 18: Predictor phenotype length 0 [ ]\n"
        );
    }

    #[test]
    fn test_history_lines_are_json() {
        let buffer = SharedBuffer::default();
        let mut journal = HistoryJournal::new(buffer.clone());
        let entry = HistoryEntry {
            generation: 12,
            fitness: 40.0,
            velocity: 2.5,
            ..HistoryEntry::default()
        };
        journal.record(&entry).unwrap();

        let text = buffer.text();
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["generation"], 12);
        assert_eq!(value["velocity"], 2.5);
        assert!(text.ends_with('\n'));
    }
}
