// Error types shared by the CFG parser and the DAT decoder.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComtradeError {
    #[error("invalid cfg file: expected at least 9 lines, got {0}")]
    TooFewLines(usize),

    #[error("invalid {field} in line {line}")]
    InvalidField { field: &'static str, line: usize },

    #[error("invalid channel count in line {line}: {total} != {analog}A + {digital}D")]
    ChannelCountMismatch {
        line: usize,
        total: u32,
        analog: u32,
        digital: u32,
    },

    #[error("channel lists do not match declared counts: {analog}A/{digital}D declared, {analog_found}A/{digital_found}D present")]
    ChannelListMismatch {
        analog: u32,
        digital: u32,
        analog_found: usize,
        digital_found: usize,
    },

    #[error("no sample rate declared, cannot size the data file")]
    NoSampleRate,

    #[error("unexpected end of data at record {record}: need {needed} bytes, buffer has {available}")]
    TruncatedRecord {
        record: usize,
        needed: usize,
        available: usize,
    },
}

impl ComtradeError {
    /// Field error for a zero-based line index.
    pub(crate) fn field(field: &'static str, index: usize) -> Self {
        ComtradeError::InvalidField {
            field,
            line: index + 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ComtradeError>;
