//! The normalized view of one input event.

/// One DNS log event, as produced by the record reader.
///
/// `ts` preserves the source form (unix seconds or RFC3339). `answers`
/// and `ttls` are parallel; the aggregator rejects records where they
/// are not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DnsRecord {
    pub ts: String,
    pub query: String,
    pub qtype: String,
    pub answers: Vec<String>,
    pub ttls: Vec<String>,
}
