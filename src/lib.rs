// src/lib.rs
// COMTRADE Reader Library - Public API

//! # COMTRADE Reader
//!
//! A Rust library for reading COMTRADE power-system disturbance recordings.
//!
//! ## Features
//!
//! - Parse the CFG configuration file (channels, calibration, sample rates, timestamps)
//! - Decode binary DAT records into calibrated per-channel samples
//! - 16-bit, 32-bit and floating-point sample words
//! - Access to the raw digital status words of each record
//! - Render a configuration back to CFG text
//!
//! Both inputs are taken from memory; reading the files is left to the caller.
//!
//! ## Example
//!
//! ```no_run
//! use comtrade_reader::{dat, Configuration};
//!
//! let cfg_text = std::fs::read_to_string("fault.cfg").expect("Failed to read CFG");
//! let dat_bytes = std::fs::read("fault.dat").expect("Failed to read DAT");
//!
//! let config = Configuration::parse(&cfg_text).expect("Invalid CFG");
//! println!("Station: {}", config.station_name);
//! println!("Analog channels: {}", config.analog_channel_count);
//!
//! let waveform = dat::decode(&config, &dat_bytes).expect("Invalid DAT");
//! if let Some(samples) = waveform.channel(1) {
//!     println!("First sample: {}", samples[0]);
//! }
//! ```

pub mod cfg;
pub mod dat;
mod error;
mod recording;

pub use cfg::{AnalogChannel, Configuration, DigitalChannel, RatioMode, SampleRate, TIME_FORMAT};
pub use dat::{
    DecodeOptions, DecodedWaveform, DigitalStatusSink, IgnoreDigital, SampleCountPolicy,
    SampleFormat, ScaledWaveform, Waveform,
};
pub use error::{ComtradeError, Result};
pub use recording::Recording;
