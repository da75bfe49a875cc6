// DAT Decoder Module
// Fixed-stride little-endian sample records

use log::{debug, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cfg::{AnalogChannel, Configuration};
use crate::error::{ComtradeError, Result};

/// Sample number and timestamp words that open every record.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Width and type of one analog sample word in a DAT record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleFormat {
    #[default]
    Int16,
    Int32,
    Float32,
}

impl SampleFormat {
    /// Pick the sample format from the CFG data file type tag.
    ///
    /// `BINARY32` and `FLOAT32` select the wide formats. Everything else, including `ASCII`,
    /// is read as 16-bit binary.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "BINARY" => SampleFormat::Int16,
            "BINARY32" => SampleFormat::Int32,
            "FLOAT32" => SampleFormat::Float32,
            "ASCII" => {
                debug!("ASCII data file type, reading samples as 16-bit binary");
                SampleFormat::Int16
            }
            other => {
                warn!("unknown data file type {:?}, assuming 16-bit samples", other);
                SampleFormat::Int16
            }
        }
    }

    /// Bytes per sample word.
    pub fn width(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
        }
    }

    // Callers pass exactly `width()` bytes.
    fn read(self, bytes: &[u8]) -> f64 {
        match self {
            SampleFormat::Int16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            SampleFormat::Int32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            SampleFormat::Float32 => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        }
    }
}

/// How many records the decoder reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SampleCountPolicy {
    /// End sample of the first sample-rate entry only.
    #[default]
    FirstRate,
    /// End sample of the last entry. End samples are cumulative, so this covers every rate block.
    AllRates,
}

/// Decoder settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub sample_count: SampleCountPolicy,
    /// Overrides the format derived from the data file type tag.
    pub sample_format: Option<SampleFormat>,
}

impl DecodeOptions {
    pub fn new() -> Self {
        DecodeOptions::default()
    }

    pub fn with_sample_count(mut self, policy: SampleCountPolicy) -> Self {
        self.sample_count = policy;
        self
    }

    pub fn with_sample_format(mut self, format: SampleFormat) -> Self {
        self.sample_format = Some(format);
        self
    }
}

/// Calibrated samples, one sequence per analog channel in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Waveform<T> {
    channels: Vec<Vec<T>>,
}

/// Calibrated values truncated toward zero.
pub type DecodedWaveform = Waveform<i64>;

/// Calibrated values at full floating-point precision.
pub type ScaledWaveform = Waveform<f64>;

impl<T> Waveform<T> {
    /// Samples of a channel by its 1-based index.
    pub fn channel(&self, index: usize) -> Option<&[T]> {
        index
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<T>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<T>> {
        self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel. Every channel has the same length.
    pub fn sample_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Receives the packed digital status words of each record.
///
/// Digital channels are not decoded into per-channel values. Implement this to inspect the
/// raw words; bit `k` of word `w` belongs to digital channel `16 * w + k + 1`.
pub trait DigitalStatusSink {
    fn status_words(&mut self, sample: usize, words: &[u16]);
}

/// Sink that drops the status words.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreDigital;

impl DigitalStatusSink for IgnoreDigital {
    fn status_words(&mut self, _sample: usize, _words: &[u16]) {}
}

impl DigitalStatusSink for Vec<Vec<u16>> {
    fn status_words(&mut self, _sample: usize, words: &[u16]) {
        self.push(words.to_vec());
    }
}

/// Decode a DAT buffer with the default options.
pub fn decode(config: &Configuration, data: &[u8]) -> Result<DecodedWaveform> {
    decode_with_options(config, data, &DecodeOptions::default())
}

pub fn decode_with_options(
    config: &Configuration,
    data: &[u8],
    options: &DecodeOptions,
) -> Result<DecodedWaveform> {
    decode_with(config, data, options, &mut IgnoreDigital)
}

/// Decode a DAT buffer, passing each record's digital status words to `sink`.
pub fn decode_with<S: DigitalStatusSink + ?Sized>(
    config: &Configuration,
    data: &[u8],
    options: &DecodeOptions,
    sink: &mut S,
) -> Result<DecodedWaveform> {
    decode_records(config, data, options, sink, AnalogChannel::calibrate_truncated)
}

/// Decode a DAT buffer keeping the fractional part of calibrated values.
pub fn decode_scaled(
    config: &Configuration,
    data: &[u8],
    options: &DecodeOptions,
) -> Result<ScaledWaveform> {
    decode_records(config, data, options, &mut IgnoreDigital, AnalogChannel::calibrate)
}

fn decode_records<T, S, F>(
    config: &Configuration,
    data: &[u8],
    options: &DecodeOptions,
    sink: &mut S,
    calibrate: F,
) -> Result<Waveform<T>>
where
    S: DigitalStatusSink + ?Sized,
    F: Fn(&AnalogChannel, f64) -> T,
{
    config.check_channels()?;

    let format = options
        .sample_format
        .unwrap_or_else(|| config.sample_format());
    let stride = config.record_stride(format);
    let records = config.sample_count(options.sample_count)?;
    let needed = records.checked_mul(stride).unwrap_or(usize::MAX);

    debug!(
        "decoding {} records of {} bytes ({:?}), buffer has {} bytes",
        records,
        stride,
        format,
        data.len()
    );

    if data.len() < needed {
        return Err(ComtradeError::TruncatedRecord {
            record: data.len() / stride,
            needed,
            available: data.len(),
        });
    }

    let width = format.width();
    let digital_offset = RECORD_HEADER_SIZE + width * config.analog_channels.len();
    let mut channels: Vec<Vec<T>> = config
        .analog_channels
        .iter()
        .map(|_| Vec::with_capacity(records))
        .collect();
    let mut words = Vec::with_capacity(config.digital_word_count());

    for (record, bytes) in data.chunks_exact(stride).take(records).enumerate() {
        for (n, channel) in config.analog_channels.iter().enumerate() {
            let offset = RECORD_HEADER_SIZE + n * width;
            let raw = format.read(&bytes[offset..offset + width]);
            channels[n].push(calibrate(channel, raw));
        }

        words.clear();
        words.extend(
            bytes[digital_offset..]
                .chunks_exact(2)
                .map(|w| u16::from_le_bytes([w[0], w[1]])),
        );
        sink.status_words(record, &words);
    }

    Ok(Waveform { channels })
}
