//! TSV dialect: `#`-directive header handling.
//!
//! Directive lines bind the state data lines are parsed with:
//!
//! ```text
//! #separator \x09
//! #fields<TAB>ts<TAB>query<TAB>...
//! #types<TAB>time<TAB>string<TAB>...
//! ```
//!
//! Directives may reappear mid-stream when log files are concatenated;
//! each occurrence re-binds the field indices for subsequent lines.

use pdns_core::errors::ReadError;
use pdns_core::FxHashMap;

/// The currently bound TSV header: separator byte, field-name indices,
/// and which columns are `time`-typed.
#[derive(Debug, Clone)]
pub struct TsvHeader {
    separator: u8,
    index: FxHashMap<String, usize>,
    time_columns: Vec<bool>,
}

impl Default for TsvHeader {
    fn default() -> Self {
        Self {
            separator: b'\t',
            index: FxHashMap::default(),
            time_columns: Vec::new(),
        }
    }
}

impl TsvHeader {
    /// Apply one directive line (without the leading `#`). Returns true
    /// when the header binding changed; unrecognized directives
    /// (`path`, `open`, `close`, ...) are ignored.
    pub(crate) fn apply_directive(&mut self, directive: &str) -> Result<bool, ReadError> {
        if let Some(escape) = directive.strip_prefix("separator ") {
            self.separator = parse_separator(escape)?;
            return Ok(true);
        }
        let sep = char::from(self.separator);
        if let Some(names) = strip_directive(directive, "fields", sep) {
            self.index = names
                .split(sep)
                .enumerate()
                .map(|(idx, name)| (name.to_string(), idx))
                .collect();
            return Ok(true);
        }
        if let Some(types) = strip_directive(directive, "types", sep) {
            self.time_columns = types.split(sep).map(|ty| ty == "time").collect();
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether the column is declared `time` in `#types`. Values are
    /// returned as strings either way.
    pub(crate) fn is_time_column(&self, idx: usize) -> bool {
        self.time_columns.get(idx).copied().unwrap_or(false)
    }

    pub(crate) fn split(&self, line: &str) -> Vec<String> {
        line.split(char::from(self.separator))
            .map(String::from)
            .collect()
    }
}

fn strip_directive<'a>(directive: &'a str, name: &str, sep: char) -> Option<&'a str> {
    directive.strip_prefix(name)?.strip_prefix(sep)
}

/// Parse the `#separator` operand: a `\xHH` hex escape, or a literal
/// single character.
fn parse_separator(escape: &str) -> Result<u8, ReadError> {
    if let Some(hex) = escape.strip_prefix("\\x") {
        return u8::from_str_radix(hex, 16).map_err(|_| ReadError::BadSeparator {
            directive: escape.to_string(),
        });
    }
    let mut bytes = escape.bytes();
    match (bytes.next(), bytes.next()) {
        (Some(b), None) => Ok(b),
        _ => Err(ReadError::BadSeparator {
            directive: escape.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_hex_escape() {
        assert_eq!(parse_separator("\\x09").unwrap(), b'\t');
        assert_eq!(parse_separator("\\x2c").unwrap(), b',');
        assert_eq!(parse_separator(",").unwrap(), b',');
        assert!(parse_separator("\\xzz").is_err());
        assert!(parse_separator("too long").is_err());
    }

    #[test]
    fn fields_bind_indices() {
        let mut header = TsvHeader::default();
        assert!(header.apply_directive("fields\tts\tquery\tanswers").unwrap());
        assert_eq!(header.field_index("ts"), Some(0));
        assert_eq!(header.field_index("answers"), Some(2));
        assert_eq!(header.field_index("missing"), None);
    }

    #[test]
    fn types_flag_time_columns() {
        let mut header = TsvHeader::default();
        header.apply_directive("fields\tts\tquery").unwrap();
        header.apply_directive("types\ttime\tstring").unwrap();
        assert!(header.is_time_column(0));
        assert!(!header.is_time_column(1));
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let mut header = TsvHeader::default();
        assert!(!header.apply_directive("path\tdns").unwrap());
        assert!(!header.apply_directive("open\t2016-04-01-00-00-00").unwrap());
    }

    #[test]
    fn separator_rebinds_split() {
        let mut header = TsvHeader::default();
        header.apply_directive("separator \\x2c").unwrap();
        header.apply_directive("fields,a,b").unwrap();
        assert_eq!(header.split("1,2"), vec!["1", "2"]);
        assert_eq!(header.field_index("b"), Some(1));
    }
}
