//! Rows returned by store queries, already un-reversed and ready to
//! serialize.

use serde::{Deserialize, Serialize};

use super::Which;

/// One row of the tuples relation. `first`/`last` are rendered as the
/// backend stores them (unix seconds for the reference backends).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleRow {
    pub query: String,
    #[serde(rename = "type")]
    pub qtype: String,
    pub answer: String,
    pub ttl: i64,
    pub count: u64,
    pub first: i64,
    pub last: i64,
}

/// One row of the individuals relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualRow {
    pub value: String,
    pub which: Which,
    pub count: u64,
    pub first: i64,
    pub last: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_row_json_shape() {
        let row = TupleRow {
            query: "www.example.com".into(),
            qtype: "A".into(),
            answer: "1.2.3.4".into(),
            ttl: 300,
            count: 1,
            first: 10,
            last: 10,
        };
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"query":"www.example.com","type":"A","answer":"1.2.3.4","ttl":300,"count":1,"first":10,"last":10}"#
        );
    }

    #[test]
    fn individual_row_json_shape() {
        let row = IndividualRow {
            value: "1.2.3.4".into(),
            which: Which::Answer,
            count: 2,
            first: 10,
            last: 20,
        };
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"value":"1.2.3.4","which":"A","count":2,"first":10,"last":20}"#
        );
    }
}
