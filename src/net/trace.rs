use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDirection {
    /// Client to server.
    In,
    /// Server to client.
    Out,
}

/// One message body recorded by the server's packet trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub timestamp: u64,
    pub direction: TraceDirection,
    pub len: usize,
    /// Bytes cut from the end of `data`; zero for a complete record.
    pub truncated: usize,
    pub data: Vec<u8>,
}

impl TraceRecord {
    pub fn is_complete(&self) -> bool {
        self.truncated == 0 && self.data.len() == self.len
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("missing field {0}")]
    Missing(&'static str),
    #[error("bad {field} '{value}'")]
    Invalid { field: &'static str, value: String },
}

/// Parses `<ts> <in|out> len=<n> [trunc=<n>] data=<hex bytes>`. Blank lines
/// and `#` comments give `None`.
pub fn parse_trace_line(line: &str) -> Result<Option<TraceRecord>, TraceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (head, hex) = match line.split_once("data=") {
        Some((head, hex)) => (head, hex),
        None => return Err(TraceError::Missing("data")),
    };
    let mut fields = head.split_whitespace();
    let timestamp = fields.next().ok_or(TraceError::Missing("timestamp"))?;
    let timestamp = timestamp.parse().map_err(|_| invalid("timestamp", timestamp))?;
    let direction = match fields.next().ok_or(TraceError::Missing("direction"))? {
        "in" => TraceDirection::In,
        "out" => TraceDirection::Out,
        other => return Err(invalid("direction", other)),
    };
    let mut len = None;
    let mut truncated = 0;
    for field in fields {
        if let Some(value) = field.strip_prefix("len=") {
            len = Some(value.parse().map_err(|_| invalid("len", value))?);
        } else if let Some(value) = field.strip_prefix("trunc=") {
            truncated = value.parse().map_err(|_| invalid("trunc", value))?;
        }
    }
    let len = len.ok_or(TraceError::Missing("len"))?;
    let data = hex
        .split_whitespace()
        .map(|byte| u8::from_str_radix(byte, 16).map_err(|_| invalid("data", byte)))
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(Some(TraceRecord {
        timestamp,
        direction,
        len,
        truncated,
        data,
    }))
}

fn invalid(field: &'static str, value: &str) -> TraceError {
    TraceError::Invalid {
        field,
        value: value.to_string(),
    }
}
