//! Format-detecting DNS log reader.
//!
//! Peeks the first byte of the stream: `#` means TSV with `#`-directive
//! headers, `{` means one JSON object per line, anything else is a
//! classification error. Both dialects yield the same [`Record`] view.
//!
//! Accessors record the first error hit on a record; callers read every
//! field and then check [`Record::take_error`] once. A missing field
//! invalidates the record, any other error invalidates the file.

mod json;
mod tsv;

use std::io::BufRead;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use pdns_core::errors::ReadError;

pub use tsv::TsvHeader;

/// A reader over one DNS log stream.
#[derive(Debug)]
pub struct LogReader<R: BufRead> {
    input: R,
    dialect: Dialect,
    header: Arc<TsvHeader>,
    line: String,
    line_no: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Tsv,
    Json,
}

impl<R: BufRead> LogReader<R> {
    /// Classify the stream by its first byte, without consuming it.
    pub fn new(mut input: R) -> Result<Self, ReadError> {
        let first = input.fill_buf()?.first().copied();
        let dialect = match first {
            Some(b'#') => Dialect::Tsv,
            Some(b'{') => Dialect::Json,
            Some(first_byte) => return Err(ReadError::UnknownFormat { first_byte }),
            None => return Err(ReadError::EmptyInput),
        };
        Ok(Self {
            input,
            dialect,
            header: Arc::new(TsvHeader::default()),
            line: String::new(),
            line_no: 0,
        })
    }

    /// The next data record, or `None` at end of input. Directive lines
    /// are consumed internally. A final line with no newline is a
    /// truncated record (e.g. a log still being written); it is dropped
    /// and the file ends cleanly, keeping everything read so far.
    pub fn next_record(&mut self) -> Result<Option<Record>, ReadError> {
        loop {
            self.line.clear();
            if self.input.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            if !self.line.ends_with('\n') {
                debug!(line = self.line_no + 1, "truncated final line, stopping");
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            match self.dialect {
                Dialect::Tsv => {
                    if let Some(directive) = line.strip_prefix('#') {
                        let mut header = TsvHeader::clone(&self.header);
                        if header.apply_directive(directive)? {
                            self.header = Arc::new(header);
                        }
                        continue;
                    }
                    let values = self.header.split(line);
                    return Ok(Some(Record::tsv(values, Arc::clone(&self.header))));
                }
                Dialect::Json => return Ok(Some(Record::json(line, self.line_no))),
            }
        }
    }
}

/// A uniform view of one input record.
pub struct Record {
    data: RecordData,
    err: Option<ReadError>,
}

enum RecordData {
    Tsv {
        values: Vec<String>,
        header: Arc<TsvHeader>,
    },
    Json {
        map: Map<String, Value>,
    },
}

impl Record {
    fn tsv(values: Vec<String>, header: Arc<TsvHeader>) -> Self {
        Self {
            data: RecordData::Tsv { values, header },
            err: None,
        }
    }

    fn json(line: &str, line_no: u64) -> Self {
        match json::parse_object(line, line_no) {
            Ok(map) => Self {
                data: RecordData::Json { map },
                err: None,
            },
            Err(err) => Self {
                data: RecordData::Json { map: Map::new() },
                err: Some(err),
            },
        }
    }

    /// Fetch a scalar field as a string.
    pub fn get_string(&mut self, field: &str) -> String {
        match self.lookup_string(field) {
            Ok(value) => value,
            Err(err) => {
                self.fail(err);
                String::new()
            }
        }
    }

    /// Fetch a timestamp field, preserving its source form. JSON numbers
    /// are rendered to a canonical decimal string.
    pub fn get_timestamp(&mut self, field: &str) -> String {
        match self.lookup_timestamp(field) {
            Ok(value) => value,
            Err(err) => {
                self.fail(err);
                String::new()
            }
        }
    }

    /// Fetch a multi-valued field. TSV cells split on `,`; a JSON record
    /// without the key yields an empty list rather than an error.
    pub fn get_string_list(&mut self, field: &str) -> Vec<String> {
        match self.lookup_string_list(field) {
            Ok(values) => values,
            Err(err) => {
                self.fail(err);
                Vec::new()
            }
        }
    }

    /// The first error any accessor hit on this record.
    pub fn error(&self) -> Option<&ReadError> {
        self.err.as_ref()
    }

    /// Take the accumulated error, leaving the record clean.
    pub fn take_error(&mut self) -> Option<ReadError> {
        self.err.take()
    }

    /// True when the accumulated error only invalidates this record.
    pub fn is_missing_field_error(&self) -> bool {
        self.err.as_ref().is_some_and(ReadError::is_missing_field)
    }

    fn fail(&mut self, err: ReadError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn lookup_string(&self, field: &str) -> Result<String, ReadError> {
        match &self.data {
            RecordData::Tsv { values, header } => match header.field_index(field) {
                Some(idx) if idx < values.len() => Ok(values[idx].clone()),
                _ => Err(missing(field)),
            },
            RecordData::Json { map } => match map.get(field) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(json::wrong_type(field, "string")),
                None => Err(missing(field)),
            },
        }
    }

    fn lookup_timestamp(&self, field: &str) -> Result<String, ReadError> {
        match &self.data {
            RecordData::Tsv { values, header } => match header.field_index(field) {
                Some(idx) if idx < values.len() => {
                    if !header.is_time_column(idx) {
                        debug!(field, "reading timestamp from a column not typed time");
                    }
                    Ok(values[idx].clone())
                }
                _ => Err(missing(field)),
            },
            RecordData::Json { map } => match map.get(field) {
                Some(value) => json::timestamp_string(field, value),
                None => Err(missing(field)),
            },
        }
    }

    fn lookup_string_list(&self, field: &str) -> Result<Vec<String>, ReadError> {
        match &self.data {
            RecordData::Tsv { values, header } => match header.field_index(field) {
                Some(idx) if idx < values.len() => {
                    Ok(values[idx].split(',').map(String::from).collect())
                }
                _ => Err(missing(field)),
            },
            RecordData::Json { map } => match map.get(field) {
                Some(value) => json::string_list(field, value),
                None => Ok(Vec::new()),
            },
        }
    }
}

fn missing(field: &str) -> ReadError {
    ReadError::MissingField {
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(input: &str) -> LogReader<Cursor<Vec<u8>>> {
        LogReader::new(Cursor::new(input.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn detects_tsv_and_json() {
        assert!(LogReader::new(Cursor::new(b"#separator \\x09\n".to_vec())).is_ok());
        assert!(LogReader::new(Cursor::new(b"{\"ts\":1}\n".to_vec())).is_ok());
    }

    #[test]
    fn rejects_unknown_first_byte() {
        let err = LogReader::new(Cursor::new(b"hello\n".to_vec())).unwrap_err();
        assert!(matches!(err, ReadError::UnknownFormat { first_byte: b'h' }));
    }

    #[test]
    fn rejects_empty_input() {
        let err = LogReader::new(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, ReadError::EmptyInput));
    }

    #[test]
    fn tsv_fields_by_name() {
        let mut r = reader(
            "#separator \\x09\n\
             #fields\tts\tquery\tanswers\n\
             #types\ttime\tstring\tvector[string]\n\
             10\twww.example.com\t1.2.3.4,1.2.3.5\n",
        );
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_timestamp("ts"), "10");
        assert_eq!(rec.get_string("query"), "www.example.com");
        assert_eq!(rec.get_string_list("answers"), vec!["1.2.3.4", "1.2.3.5"]);
        assert!(rec.take_error().is_none());
    }

    #[test]
    fn tsv_missing_field_is_skippable() {
        let mut r = reader("#fields\tts\tquery\n10\twww\n");
        let mut rec = r.next_record().unwrap().unwrap();
        rec.get_string("nonexistent");
        assert!(rec.is_missing_field_error());
    }

    #[test]
    fn tsv_short_line_is_missing_field() {
        let mut r = reader("#fields\tts\tquery\tanswers\n10\twww\n");
        let mut rec = r.next_record().unwrap().unwrap();
        rec.get_string_list("answers");
        assert!(rec.is_missing_field_error());
    }

    #[test]
    fn tsv_headers_rebind_mid_stream() {
        let mut r = reader(
            "#fields\tts\tquery\n\
             10\tfirst.example.com\n\
             #fields\tquery\tts\n\
             second.example.com\t20\n",
        );
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_string("query"), "first.example.com");
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_string("query"), "second.example.com");
        assert_eq!(rec.get_timestamp("ts"), "20");
        assert!(rec.take_error().is_none());
    }

    #[test]
    fn truncated_final_line_is_a_clean_stop() {
        let mut r = reader(
            "#fields\tts\tquery\n\
             10\twhole.example.com\n\
             20\ttrunc",
        );
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_string("query"), "whole.example.com");
        // The unterminated record is dropped, not an error.
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn json_scalars_and_lists() {
        let mut r = reader(
            "{\"ts\":\"10\",\"query\":\"www.example.com\",\"qtype_name\":\"A\",\
             \"answers\":[\"1.2.3.4\"],\"TTLs\":[300]}\n",
        );
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_timestamp("ts"), "10");
        assert_eq!(rec.get_string("query"), "www.example.com");
        assert_eq!(rec.get_string_list("answers"), vec!["1.2.3.4"]);
        assert_eq!(rec.get_string_list("TTLs"), vec!["300"]);
        assert!(rec.take_error().is_none());
    }

    #[test]
    fn json_numeric_timestamps() {
        let mut r = reader("{\"ts\":1459468983.764585}\n{\"ts\":10}\n");
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_timestamp("ts"), "1459468983.764585");
        let mut rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.get_timestamp("ts"), "10");
    }

    #[test]
    fn json_missing_scalar_vs_missing_list() {
        let mut r = reader("{\"query\":\"www\"}\n");
        let mut rec = r.next_record().unwrap().unwrap();
        // Missing list keys are tolerated as empty.
        assert_eq!(rec.get_string_list("answers"), Vec::<String>::new());
        assert!(rec.error().is_none());
        // Missing scalars invalidate the record.
        rec.get_timestamp("ts");
        assert!(rec.is_missing_field_error());
    }

    #[test]
    fn json_type_error_is_not_missing_field() {
        let mut r = reader("{\"query\":42}\n");
        let mut rec = r.next_record().unwrap().unwrap();
        rec.get_string("query");
        assert!(rec.error().is_some());
        assert!(!rec.is_missing_field_error());
    }

    #[test]
    fn json_malformed_line_aborts_file() {
        let mut r = reader("{\"query\": oops}\n");
        let mut rec = r.next_record().unwrap().unwrap();
        rec.get_string("query");
        assert!(matches!(rec.take_error(), Some(ReadError::BadJson { .. })));
    }

    #[test]
    fn accessors_keep_first_error() {
        let mut r = reader("{\"query\":42}\n");
        let mut rec = r.next_record().unwrap().unwrap();
        rec.get_string("query");
        rec.get_string("also-missing");
        assert!(matches!(rec.take_error(), Some(ReadError::WrongType { .. })));
    }
}
