use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::RelayId;

/// Direction of a measured relay link.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the measuring client up to the relay, reported as `U_R_self`.
    UpstreamToRelay,
    /// From the relay back to the measuring client, reported as `R_U_self`.
    RelayToUpstream,
}

impl Direction {
    /// Both directions in the order they are processed.
    pub const ALL: [Direction; 2] = [Direction::UpstreamToRelay, Direction::RelayToUpstream];

    /// Returns the short name of this direction, used as a metric tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::UpstreamToRelay => "ur",
            Direction::RelayToUpstream => "ru",
        }
    }

    /// Returns the key of the telemetry array holding readings for this direction.
    fn json_key(self) -> &'static str {
        match self {
            Direction::UpstreamToRelay => "U_R_self",
            Direction::RelayToUpstream => "R_U_self",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay per relay for one link direction of a single telemetry record.
pub type DirectionalDelayMap = BTreeMap<RelayId, f64>;

/// The delays extracted from a single telemetry record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DelayReadings {
    /// Delays reported in `U_R_self`.
    pub upstream_to_relay: DirectionalDelayMap,
    /// Delays reported in `R_U_self`.
    pub relay_to_upstream: DirectionalDelayMap,
}

impl DelayReadings {
    /// Returns the delay map of the given direction.
    pub fn get(&self, direction: Direction) -> &DirectionalDelayMap {
        match direction {
            Direction::UpstreamToRelay => &self.upstream_to_relay,
            Direction::RelayToUpstream => &self.relay_to_upstream,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut DirectionalDelayMap {
        match direction {
            Direction::UpstreamToRelay => &mut self.upstream_to_relay,
            Direction::RelayToUpstream => &mut self.relay_to_upstream,
        }
    }

    /// Returns `true` if neither direction has a reading.
    pub fn is_empty(&self) -> bool {
        self.upstream_to_relay.is_empty() && self.relay_to_upstream.is_empty()
    }
}

/// An error returned by [`parse`] when a reading has a value of the wrong type.
#[derive(Debug, thiserror::Error)]
#[error("expected a number for `{field}` in {direction} entry {index}, found {found}")]
pub struct ParseError {
    /// The direction of the array holding the entry.
    pub direction: Direction,
    /// Zero-based position of the entry in its array.
    pub index: usize,
    /// The name of the offending field.
    pub field: &'static str,
    /// The JSON type that was found instead.
    pub found: &'static str,
}

/// Extracts the per relay delays from a plaintext telemetry document.
///
/// The document is expected to look like this:
///
/// ```json
/// {"ur_link_info": {"U_R_self": [{"relayID": 1, "delay": 37}], "R_U_self": []}}
/// ```
///
/// Parsing is lenient about the shape of the document. Invalid JSON, a missing or non-object
/// `ur_link_info`, missing or non-array direction keys, non-object entries and entries lacking one
/// of the two fields all produce no readings rather than an error. If a relay occurs more than
/// once in the same array, the last entry wins.
///
/// A `relayID` or `delay` that is present but not a number fails the whole record. Fractional relay
/// ids are truncated toward zero.
pub fn parse(plaintext: &str) -> Result<DelayReadings, ParseError> {
    let mut readings = DelayReadings::default();

    let Ok(document) = serde_json::from_str::<Value>(plaintext) else {
        return Ok(readings);
    };

    let Some(link_info) = document.get("ur_link_info").and_then(Value::as_object) else {
        return Ok(readings);
    };

    for direction in Direction::ALL {
        parse_direction(link_info, direction, readings.get_mut(direction))?;
    }

    Ok(readings)
}

fn parse_direction(
    link_info: &Map<String, Value>,
    direction: Direction,
    map: &mut DirectionalDelayMap,
) -> Result<(), ParseError> {
    let Some(entries) = link_info.get(direction.json_key()).and_then(Value::as_array) else {
        return Ok(());
    };

    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            continue;
        };

        let (Some(relay_id), Some(delay)) = (entry.get("relayID"), entry.get("delay")) else {
            continue;
        };

        let invalid = |field, value: &Value| ParseError {
            direction,
            index,
            field,
            found: json_type(value),
        };

        let delay = delay.as_f64().ok_or_else(|| invalid("delay", delay))?;
        let relay_id = as_relay_id(relay_id).ok_or_else(|| invalid("relayID", relay_id))?;

        map.insert(relay_id, delay);
    }

    Ok(())
}

/// Reads a relay id from any JSON number. Floats are truncated toward zero and saturate at the
/// bounds of `i64`.
fn as_relay_id(value: &Value) -> Option<RelayId> {
    if let Some(id) = value.as_i64() {
        return Some(RelayId::new(id));
    }

    value.as_f64().map(|float| RelayId::new(float as i64))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn map(pairs: &[(i64, f64)]) -> DirectionalDelayMap {
        pairs
            .iter()
            .map(|&(id, delay)| (RelayId::new(id), delay))
            .collect()
    }

    #[test]
    fn test_parse_both_directions() {
        let json = r#"{
            "ur_link_info": {
                "U_R_self": [{"relayID": 1, "delay": 37}, {"relayID": 2, "delay": 12.5}],
                "R_U_self": [{"relayID": 1, "delay": 41}]
            }
        }"#;

        let readings = parse(json).unwrap();
        assert_eq!(readings.upstream_to_relay, map(&[(1, 37.0), (2, 12.5)]));
        assert_eq!(readings.relay_to_upstream, map(&[(1, 41.0)]));
    }

    #[test]
    fn test_parse_idempotent() {
        let json = r#"{"ur_link_info":{"U_R_self":[{"relayID":3,"delay":9}],"R_U_self":[{"relayID":4,"delay":0}]}}"#;
        assert_eq!(parse(json).unwrap(), parse(json).unwrap());
    }

    #[test]
    fn test_parse_duplicate_last_wins() {
        let json = r#"{"ur_link_info":{"U_R_self":[{"relayID":1,"delay":10},{"relayID":1,"delay":20}]}}"#;

        let readings = parse(json).unwrap();
        assert_eq!(readings.upstream_to_relay, map(&[(1, 20.0)]));
        assert!(readings.relay_to_upstream.is_empty());
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(parse("{not json").unwrap().is_empty());
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_unexpected_shapes() {
        for json in [
            "[]",
            "42",
            "{}",
            r#"{"ur_link_info": null}"#,
            r#"{"ur_link_info": [1, 2]}"#,
            r#"{"ur_link_info": {"U_R_self": null, "R_U_self": {"relayID": 1, "delay": 2}}}"#,
        ] {
            assert!(parse(json).unwrap().is_empty(), "{json}");
        }
    }

    #[test]
    fn test_parse_skips_incomplete_entries() {
        let json = r#"{"ur_link_info":{"U_R_self":[
            7,
            "entry",
            {"relayID": 1},
            {"delay": 5},
            {"relayID": 2, "delay": 6}
        ]}}"#;

        let readings = parse(json).unwrap();
        assert_eq!(readings.upstream_to_relay, map(&[(2, 6.0)]));
    }

    #[test]
    fn test_parse_float_relay_id() {
        let json = r#"{"ur_link_info":{"R_U_self":[{"relayID":5.0,"delay":1}]}}"#;
        assert_eq!(parse(json).unwrap().relay_to_upstream, map(&[(5, 1.0)]));
    }

    #[test]
    fn test_parse_non_numeric_delay() {
        let json = r#"{"ur_link_info":{"U_R_self":[{"relayID":1,"delay":3},{"relayID":2,"delay":"slow"}]}}"#;

        let error = parse(json).unwrap_err();
        assert_eq!(
            error.to_string(),
            "expected a number for `delay` in ur entry 1, found string"
        );
    }

    #[test]
    fn test_parse_non_numeric_relay_id() {
        let json = r#"{"ur_link_info":{"R_U_self":[{"relayID":null,"delay":3}]}}"#;
        let error = parse(json).unwrap_err();
        assert_eq!(error.direction, Direction::RelayToUpstream);
        assert_eq!(error.field, "relayID");
        assert_eq!(error.found, "null");
    }

    #[test]
    fn test_parse_fractional_relay_id_truncated() {
        let json = r#"{"ur_link_info":{"U_R_self":[{"relayID":1,"delay":37},{"relayID":2.5,"delay":3}],"R_U_self":[{"relayID":-3.9,"delay":4}]}}"#;
        let readings = parse(json).unwrap();
        assert_eq!(readings.upstream_to_relay, map(&[(1, 37.0), (2, 3.0)]));
        assert_eq!(readings.relay_to_upstream, map(&[(-3, 4.0)]));
    }

    #[test]
    fn test_readings_serialize() {
        let readings = parse(
            r#"{"ur_link_info":{"U_R_self":[{"relayID":1,"delay":37}],"R_U_self":[{"relayID":2,"delay":4.5}]}}"#,
        )
        .unwrap();

        insta::assert_json_snapshot!(readings, @r#"
        {
          "upstream_to_relay": {
            "1": 37.0
          },
          "relay_to_upstream": {
            "2": 4.5
          }
        }
        "#);
    }
}
