// CFG Parser Module
// Line-positional grammar of the COMTRADE configuration file

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dat::{SampleCountPolicy, SampleFormat, RECORD_HEADER_SIZE};
use crate::error::{ComtradeError, Result};

/// Timestamp layout: `DD/MM/YYYY,HH:MM:SS.ffffff`, exactly six fractional digits.
pub const TIME_FORMAT: &str = "%d/%m/%Y,%H:%M:%S.%6f";

const MIN_LINES: usize = 9;
const ANALOG_FIELDS: usize = 13;

/// Whether the channel ratio refers to the primary or secondary side.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RatioMode {
    Primary,
    Secondary,
    /// Any other tag, kept as written.
    Other(String),
}

impl RatioMode {
    fn parse(text: &str) -> Self {
        match text.trim() {
            "P" | "p" => RatioMode::Primary,
            "S" | "s" => RatioMode::Secondary,
            _ => RatioMode::Other(text.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RatioMode::Primary => "P",
            RatioMode::Secondary => "S",
            RatioMode::Other(tag) => tag,
        }
    }
}

/// One analog channel declaration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalogChannel {
    /// 1-based, equal to the declaration order.
    pub index: u32,
    pub name: String,
    pub phase: String,
    pub element: String,
    pub unit: String,
    /// Multiplier.
    pub a: f64,
    /// Offset.
    pub b: f64,
    pub skew: f64,
    pub min: i32,
    pub max: i32,
    pub primary: f64,
    pub secondary: f64,
    pub ratio_mode: RatioMode,
}

impl AnalogChannel {
    /// Apply the channel calibration: `raw * a + b`.
    pub fn calibrate(&self, raw: f64) -> f64 {
        raw * self.a + self.b
    }

    /// Calibrate and truncate toward zero. Out of range results saturate.
    pub fn calibrate_truncated(&self, raw: f64) -> i64 {
        self.calibrate(raw) as i64
    }
}

/// Placeholder for a digital (status) channel.
///
/// The line is consumed during parsing and its packed status bits occupy space in each DAT
/// record, but no per-channel fields are decoded. Raw status words are available through
/// [`crate::DigitalStatusSink`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigitalChannel;

/// A sampling rate and the cumulative sample number at which it ends.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleRate {
    pub rate: f64,
    pub end_sample: u64,
}

/// A fully parsed CFG file.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Configuration {
    pub station_name: String,
    pub device_id: String,
    pub revision_year: u16,
    pub channel_count: u32,
    pub analog_channel_count: u32,
    pub digital_channel_count: u32,
    pub analog_channels: Vec<AnalogChannel>,
    pub digital_channels: Vec<DigitalChannel>,
    pub line_frequency: f64,
    pub sample_rate_count: u32,
    pub sample_rates: Vec<SampleRate>,
    pub start_time: NaiveDateTime,
    pub trigger_time: NaiveDateTime,
    pub data_file_type: String,
    pub time_factor: f64,
}

impl Configuration {
    /// Parse the text of a CFG file.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines: Vec<&str> = content.split('\n').collect();
        if lines.first().is_some_and(|line| line.ends_with('\r')) {
            lines = content.split("\r\n").collect();
        }
        if lines.len() < MIN_LINES {
            return Err(ComtradeError::TooFewLines(lines.len()));
        }

        let cursor = LineCursor::new(&lines);
        let (ident, cursor) = parse_identification(cursor)?;
        let (counts, cursor) = parse_channel_counts(cursor)?;
        debug!(
            "cfg {}/{}: {} channels ({}A, {}D)",
            ident.station_name, ident.device_id, counts.total, counts.analog, counts.digital
        );

        let mut cursor = cursor;
        let mut analog_channels = Vec::with_capacity(cursor.capacity_for(counts.analog));
        for expected in 1..=counts.analog {
            let (channel, next) = parse_analog_channel(cursor, expected)?;
            analog_channels.push(channel);
            cursor = next;
        }

        let mut digital_channels = Vec::with_capacity(cursor.capacity_for(counts.digital));
        for _ in 0..counts.digital {
            let (_, next) = cursor.next("digital channel")?;
            digital_channels.push(DigitalChannel);
            cursor = next;
        }

        let (line, cursor) = cursor.next("line frequency")?;
        let line_frequency: f64 = line.parse("line frequency")?;
        let (line, cursor) = cursor.next("sample rate count")?;
        let sample_rate_count: u32 = line.parse("sample rate count")?;

        let mut cursor = cursor;
        let mut sample_rates = Vec::with_capacity(cursor.capacity_for(sample_rate_count));
        for _ in 0..sample_rate_count {
            let (rate, next) = parse_sample_rate(cursor)?;
            sample_rates.push(rate);
            cursor = next;
        }

        let (line, cursor) = cursor.next("start time")?;
        let start_time = line.timestamp("start time")?;
        let (line, cursor) = cursor.next("trigger time")?;
        let trigger_time = line.timestamp("trigger time")?;
        let (line, cursor) = cursor.next("data file type")?;
        let data_file_type = line.text.to_string();
        let (line, _) = cursor.next("time factor")?;
        let time_factor: f64 = line.parse("time factor")?;

        debug!(
            "cfg parsed: {} sample rate(s), data file type {:?}",
            sample_rate_count, data_file_type
        );

        Ok(Configuration {
            station_name: ident.station_name,
            device_id: ident.device_id,
            revision_year: ident.revision_year,
            channel_count: counts.total,
            analog_channel_count: counts.analog,
            digital_channel_count: counts.digital,
            analog_channels,
            digital_channels,
            line_frequency,
            sample_rate_count,
            sample_rates,
            start_time,
            trigger_time,
            data_file_type,
            time_factor,
        })
    }

    /// Render the configuration back to CFG text with LF line endings.
    pub fn to_cfg_string(&self) -> String {
        self.to_string()
    }

    /// Look up an analog channel by its 1-based index.
    pub fn analog_channel(&self, index: usize) -> Option<&AnalogChannel> {
        index
            .checked_sub(1)
            .and_then(|i| self.analog_channels.get(i))
    }

    /// Sample word format implied by the data file type tag.
    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::from_tag(&self.data_file_type)
    }

    /// Check that the declared channel counts match the channel lists.
    ///
    /// Always true after [`Configuration::parse`]; a hand-built or deserialized value may differ.
    pub fn check_channels(&self) -> Result<()> {
        let analog_found = self.analog_channels.len();
        let digital_found = self.digital_channels.len();
        if analog_found != self.analog_channel_count as usize
            || digital_found != self.digital_channel_count as usize
        {
            return Err(ComtradeError::ChannelListMismatch {
                analog: self.analog_channel_count,
                digital: self.digital_channel_count,
                analog_found,
                digital_found,
            });
        }
        Ok(())
    }

    /// Number of 16-bit words holding the packed digital status bits.
    pub fn digital_word_count(&self) -> usize {
        (self.digital_channel_count as usize + 15) / 16
    }

    /// Size in bytes of a single DAT record.
    pub fn record_stride(&self, format: SampleFormat) -> usize {
        RECORD_HEADER_SIZE
            + format.width() * self.analog_channel_count as usize
            + 2 * self.digital_word_count()
    }

    /// Number of records to decode under the given policy.
    pub fn sample_count(&self, policy: SampleCountPolicy) -> Result<usize> {
        let entry = match policy {
            SampleCountPolicy::FirstRate => {
                if self.sample_rates.len() > 1 {
                    warn!(
                        "{} sample rates declared, decoding only the first {} samples",
                        self.sample_rates.len(),
                        self.sample_rates[0].end_sample
                    );
                }
                self.sample_rates.first()
            }
            SampleCountPolicy::AllRates => self.sample_rates.last(),
        }
        .ok_or(ComtradeError::NoSampleRate)?;

        Ok(usize::try_from(entry.end_sample).unwrap_or(usize::MAX))
    }
}

impl FromStr for Configuration {
    type Err = ComtradeError;

    fn from_str(s: &str) -> Result<Self> {
        Configuration::parse(s)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{},{},{}", self.station_name, self.device_id, self.revision_year)?;
        writeln!(
            f,
            "{},{}A,{}D",
            self.channel_count, self.analog_channel_count, self.digital_channel_count
        )?;
        for ch in &self.analog_channels {
            writeln!(
                f,
                "{},{},{},{},{},{},{},{},{},{},{},{},{}",
                ch.index,
                ch.name,
                ch.phase,
                ch.element,
                ch.unit,
                ch.a,
                ch.b,
                ch.skew,
                ch.min,
                ch.max,
                ch.primary,
                ch.secondary,
                ch.ratio_mode.as_str()
            )?;
        }
        for k in 1..=self.digital_channels.len() {
            writeln!(f, "{},D{},,,0", k, k)?;
        }
        writeln!(f, "{}", self.line_frequency)?;
        writeln!(f, "{}", self.sample_rates.len())?;
        for rate in &self.sample_rates {
            writeln!(f, "{},{}", rate.rate, rate.end_sample)?;
        }
        writeln!(f, "{}", self.start_time.format(TIME_FORMAT))?;
        writeln!(f, "{}", self.trigger_time.format(TIME_FORMAT))?;
        writeln!(f, "{}", self.data_file_type)?;
        writeln!(f, "{}", self.time_factor)
    }
}

/// Read position over the split CFG lines. Copied, never mutated in place.
#[derive(Clone, Copy, Debug)]
struct LineCursor<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(lines: &'a [&'a str]) -> Self {
        LineCursor { lines, pos: 0 }
    }

    /// Declared record count, bounded by the lines actually left.
    fn capacity_for(&self, declared: u32) -> usize {
        let remaining = self.lines.len().saturating_sub(self.pos);
        (declared as usize).min(remaining)
    }

    /// Take the current line, failing with `field` if the file has ended.
    fn next(self, field: &'static str) -> Result<(Line<'a>, LineCursor<'a>)> {
        let text = self
            .lines
            .get(self.pos)
            .copied()
            .ok_or_else(|| ComtradeError::field(field, self.pos))?;
        let line = Line {
            text,
            index: self.pos,
        };
        Ok((
            line,
            LineCursor {
                lines: self.lines,
                pos: self.pos + 1,
            },
        ))
    }
}

#[derive(Clone, Copy, Debug)]
struct Line<'a> {
    text: &'a str,
    index: usize,
}

impl<'a> Line<'a> {
    fn fields(&self) -> Vec<&'a str> {
        self.text.split(',').collect()
    }

    fn error(&self, field: &'static str) -> ComtradeError {
        ComtradeError::field(field, self.index)
    }

    fn parse<T: FromStr>(&self, field: &'static str) -> Result<T> {
        parse_field(self.text, field, self.index)
    }

    fn timestamp(&self, field: &'static str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.text.trim(), TIME_FORMAT).map_err(|_| self.error(field))
    }
}

fn parse_field<T: FromStr>(text: &str, field: &'static str, index: usize) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| ComtradeError::field(field, index))
}

struct Identification {
    station_name: String,
    device_id: String,
    revision_year: u16,
}

struct ChannelCounts {
    total: u32,
    analog: u32,
    digital: u32,
}

fn parse_identification(cursor: LineCursor<'_>) -> Result<(Identification, LineCursor<'_>)> {
    let (line, cursor) = cursor.next("cfg file")?;
    let fields = line.fields();
    if fields.len() < 3 {
        return Err(line.error("cfg file"));
    }

    let ident = Identification {
        station_name: fields[0].to_string(),
        device_id: fields[1].to_string(),
        revision_year: parse_field(fields[2], "year", line.index)?,
    };
    Ok((ident, cursor))
}

fn parse_channel_counts(cursor: LineCursor<'_>) -> Result<(ChannelCounts, LineCursor<'_>)> {
    let (line, cursor) = cursor.next("channel count")?;
    let fields = line.fields();
    if fields.len() < 3 {
        return Err(line.error("channel count"));
    }

    let total: u32 = parse_field(fields[0], "channel count", line.index)?;
    let analog: u32 = fields[1]
        .trim()
        .strip_suffix('A')
        .ok_or_else(|| line.error("analog channel count"))
        .and_then(|n| parse_field(n, "analog channel count", line.index))?;
    let digital: u32 = fields[2]
        .trim()
        .strip_suffix('D')
        .ok_or_else(|| line.error("digital channel count"))
        .and_then(|n| parse_field(n, "digital channel count", line.index))?;

    if analog.checked_add(digital) != Some(total) {
        return Err(ComtradeError::ChannelCountMismatch {
            line: line.index + 1,
            total,
            analog,
            digital,
        });
    }

    Ok((
        ChannelCounts {
            total,
            analog,
            digital,
        },
        cursor,
    ))
}

/// The id leads and the eight calibration fields close the line. Any text columns beyond
/// name, phase, element and unit are kept in `element`, since CFG has no comma escaping.
fn parse_analog_channel(
    cursor: LineCursor<'_>,
    expected_index: u32,
) -> Result<(AnalogChannel, LineCursor<'_>)> {
    let (line, cursor) = cursor.next("analog channel")?;
    let f = line.fields();
    if f.len() < ANALOG_FIELDS {
        return Err(line.error("analog channel"));
    }

    let index: u32 = parse_field(f[0], "id", line.index)?;
    if index != expected_index {
        return Err(line.error("id"));
    }

    let unit_at = f.len() - 9;
    let tail = &f[unit_at + 1..];
    let channel = AnalogChannel {
        index,
        name: f[1].to_string(),
        phase: f[2].to_string(),
        element: f[3..unit_at].join(","),
        unit: f[unit_at].to_string(),
        a: parse_field(tail[0], "value a", line.index)?,
        b: parse_field(tail[1], "value b", line.index)?,
        skew: parse_field(tail[2], "skew", line.index)?,
        min: parse_field(tail[3], "min", line.index)?,
        max: parse_field(tail[4], "max", line.index)?,
        primary: parse_field(tail[5], "primary", line.index)?,
        secondary: parse_field(tail[6], "secondary", line.index)?,
        ratio_mode: RatioMode::parse(tail[7]),
    };
    Ok((channel, cursor))
}

fn parse_sample_rate(cursor: LineCursor<'_>) -> Result<(SampleRate, LineCursor<'_>)> {
    let (line, cursor) = cursor.next("sample rate")?;
    let fields = line.fields();
    if fields.len() != 2 {
        return Err(line.error("sample rate"));
    }

    let rate = parse_field(fields[0], "rate", line.index)?;
    let end_sample = parse_end_sample(fields[1], line.index)?;
    Ok((SampleRate { rate, end_sample }, cursor))
}

/// End sample numbers are integers, but some recorders write them as `1000.0`.
fn parse_end_sample(text: &str, index: usize) -> Result<u64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u64>() {
        return Ok(n);
    }
    match text.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
        _ => Err(ComtradeError::field("end sample", index)),
    }
}
