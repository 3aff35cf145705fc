//! Reader for the text capture format written by the `usbsniff` capture tool.
//!
//! One transfer per line:
//!
//! ```text
//! # GET DESCRIPTOR Request DEVICE
//! BULK_OUT(0.2):  a1b2ffff0c # 0.0000000000000000
//! CTRL_OUT(0.0):  21:09:0200:0000:0102ffff # 0.0012000000000000
//! ```
//!
//! Control transfers carry the setup fields before the payload. Lines starting
//! with `#` are annotations and carry no data.

use crate::error::DlError;
use std::fmt;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransferKind {
    #[strum(to_string = "ISOC")]
    Isochronous,
    #[strum(to_string = "INTR")]
    Interrupt,
    #[strum(to_string = "CTRL")]
    Control,
    #[strum(to_string = "BULK")]
    Bulk,
}

impl TransferKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ISOC" => Some(TransferKind::Isochronous),
            "INTR" => Some(TransferKind::Interrupt),
            "CTRL" => Some(TransferKind::Control),
            "BULK" => Some(TransferKind::Bulk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[strum(to_string = "IN")]
    In,
    #[strum(to_string = "OUT")]
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl fmt::Display for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:04x}:{:04x}",
            self.request_type, self.request, self.value, self.index
        )
    }
}

/// One captured transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    /// 1-based line number in the capture file
    pub line: usize,
    pub transfer: TransferKind,
    pub direction: Direction,
    pub endpoint: u8,
    pub setup: Option<SetupPacket>,
    /// Payload as it appears in the file (lowercase hex text)
    pub payload: String,
    /// Seconds since the previous transfer
    pub delay: Option<f64>,
}

impl ReplayRecord {
    pub fn contains(&self, placeholder: &str) -> bool {
        !placeholder.is_empty() && self.payload.contains(placeholder)
    }

    pub fn payload_bytes(&self) -> Vec<u8> {
        // validated at parse time
        hex::decode(&self.payload).unwrap_or_default()
    }
}

impl fmt::Display for ReplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}({}): ", self.transfer, self.direction, self.endpoint)?;
        if let Some(setup) = &self.setup {
            write!(f, "{}:", setup)?;
        }
        write!(f, "{}", self.payload)
    }
}

/// Parse a whole capture, skipping blank and annotation lines.
pub fn parse_capture(text: &str) -> Result<Vec<ReplayRecord>, DlError> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(record) = parse_line(idx + 1, line)? {
            records.push(record);
        }
    }
    Ok(records)
}

pub fn parse_line(line_no: usize, line: &str) -> Result<Option<ReplayRecord>, DlError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let err = |message: &str| DlError::CaptureParse {
        line: line_no,
        message: message.to_string(),
    };

    let (header, rest) = line.split_once("):").ok_or_else(|| err("missing transfer header"))?;
    let (kind_dir, endpoint) = header.split_once('(').ok_or_else(|| err("missing endpoint"))?;
    let (kind, dir) = kind_dir.split_once('_').ok_or_else(|| err("missing direction"))?;

    let transfer = TransferKind::parse(kind).ok_or_else(|| err("unknown transfer type"))?;
    let direction = match dir {
        "IN" => Direction::In,
        "OUT" => Direction::Out,
        _ => return Err(err("unknown direction")),
    };
    let endpoint = endpoint
        .rsplit('.')
        .next()
        .and_then(|ep| ep.parse::<u8>().ok())
        .ok_or_else(|| err("invalid endpoint number"))?;

    let (body, delay) = match rest.split_once('#') {
        Some((body, delay)) => {
            let delay = delay.trim().parse::<f64>().map_err(|_| err("invalid timestamp"))?;
            (body.trim(), Some(delay))
        }
        None => (rest.trim(), None),
    };

    let (setup, payload) = if transfer == TransferKind::Control {
        let fields: Vec<&str> = body.splitn(5, ':').collect();
        if fields.len() != 5 {
            return Err(err("control transfer without setup fields"));
        }
        let setup = SetupPacket {
            request_type: u8::from_str_radix(fields[0], 16).map_err(|_| err("invalid bmRequestType"))?,
            request: u8::from_str_radix(fields[1], 16).map_err(|_| err("invalid bRequest"))?,
            value: u16::from_str_radix(fields[2], 16).map_err(|_| err("invalid wValue"))?,
            index: u16::from_str_radix(fields[3], 16).map_err(|_| err("invalid wIndex"))?,
        };
        (Some(setup), fields[4])
    } else {
        (None, body)
    };

    if hex::decode(payload).is_err() {
        return Err(err("payload is not valid hex"));
    }

    Ok(Some(ReplayRecord {
        line: line_no,
        transfer,
        direction,
        endpoint,
        setup,
        payload: payload.to_ascii_lowercase(),
        delay,
    }))
}
