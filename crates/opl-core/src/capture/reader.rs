//! DRO v2.0 reader

use nom::bytes::complete::{tag, take};
use nom::multi::count;
use nom::number::complete::{le_u16, le_u32, u8 as byte};
use nom::sequence::{pair, tuple};
use nom::IResult;
use num_traits::FromPrimitive;

use super::{DroHardware, DroHeader, DRO_MAGIC};
use crate::{OplError, Result};

/// One decoded command of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroEvent {
    /// Wait this many milliseconds
    Delay(u32),
    /// Register write (bit 8 of `reg` selects bank 1)
    Write {
        /// Full register index
        reg: u16,
        /// Value
        value: u8,
    },
}

/// A parsed capture
#[derive(Debug, Clone)]
pub struct DroSong {
    /// File header
    pub header: DroHeader,
    /// Raw code to register table
    pub table: Vec<u8>,
    /// Commands in file order
    pub events: Vec<DroEvent>,
}

impl DroSong {
    /// Sum of all delays in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.events
            .iter()
            .map(|e| match e {
                DroEvent::Delay(ms) => *ms as u64,
                DroEvent::Write { .. } => 0,
            })
            .sum()
    }

    /// Number of register writes
    pub fn write_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, DroEvent::Write { .. }))
            .count()
    }
}

type RawHeader = (u16, u16, u32, u32, u8, u8, u8, u8, u8, u8);

fn header(input: &[u8]) -> IResult<&[u8], RawHeader> {
    let (input, _) = tag(&DRO_MAGIC[..])(input)?;
    tuple((
        le_u16, le_u16, le_u32, le_u32, byte, byte, byte, byte, byte, byte,
    ))(input)
}

fn parse_error(what: &str, err: nom::Err<nom::error::Error<&[u8]>>) -> OplError {
    let detail = match err {
        nom::Err::Incomplete(_) => "unexpected end of data".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => format!("{:?}", e.code),
    };
    OplError::ParseError(format!("DRO {what}: {detail}"))
}

/// Parse a DRO v2.0 capture
///
/// # Arguments
///
/// * `data` - Complete file contents
///
/// # Returns
///
/// The decoded song, with delay codes expanded to milliseconds
pub fn parse_dro(data: &[u8]) -> Result<DroSong> {
    let (rest, raw) = header(data).map_err(|e| parse_error("header", e))?;
    let (version_high, version_low, commands, milliseconds, hw, format, compression, d256, ds8, size) =
        raw;

    if version_high != 2 {
        return Err(OplError::ParseError(format!(
            "Unsupported DRO version {version_high}.{version_low}"
        )));
    }
    if format != 0 || compression != 0 {
        return Err(OplError::ParseError(format!(
            "Unsupported DRO format {format} / compression {compression}"
        )));
    }
    let hardware = DroHardware::from_u8(hw)
        .ok_or_else(|| OplError::ParseError(format!("Unknown DRO hardware type {hw}")))?;

    let (rest, table) = take(size as usize)(rest).map_err(|e| parse_error("table", e))?;
    let (_, pairs) =
        count(pair(byte, byte), commands as usize)(rest).map_err(|e| parse_error("commands", e))?;

    let mut events = Vec::with_capacity(pairs.len());
    for (raw, value) in pairs {
        let code = raw & 0x7f;
        let event = if raw == d256 {
            DroEvent::Delay(value as u32 + 1)
        } else if raw == ds8 {
            DroEvent::Delay((value as u32 + 1) << 8)
        } else {
            let reg = *table.get(code as usize).ok_or_else(|| {
                OplError::ParseError(format!("Raw code {raw:#04x} outside conversion table"))
            })?;
            let bank = if raw & 0x80 != 0 { 0x100 } else { 0 };
            DroEvent::Write {
                reg: bank | reg as u16,
                value,
            }
        };
        events.push(event);
    }

    Ok(DroSong {
        header: DroHeader {
            version_high,
            version_low,
            commands,
            milliseconds,
            hardware,
            format,
            compression,
            delay256: d256,
            delay_shift8: ds8,
            table_size: size,
        },
        table: table.to_vec(),
        events,
    })
}
