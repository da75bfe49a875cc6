// src/main.rs
// Command-line application for COMTRADE Reader

use std::error::Error;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use comtrade_reader::{dat, Configuration, DecodeOptions, SampleCountPolicy, SampleFormat};
use log::info;

#[derive(Debug, Parser)]
#[command(name = "comtrade_reader")]
#[command(about = "Read COMTRADE CFG/DAT disturbance recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Display CFG file information
    Info {
        cfg: PathBuf,
        /// Print the whole configuration as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode all analog channels to CSV on stdout
    Decode {
        cfg: PathBuf,
        dat: PathBuf,
        #[command(flatten)]
        decode: DecodeArgs,
        /// Keep the fractional part of calibrated values
        #[arg(long)]
        scaled: bool,
    },
    /// Print one channel's calibrated samples, one per line
    Channel {
        cfg: PathBuf,
        dat: PathBuf,
        /// 1-based analog channel index
        index: usize,
        #[command(flatten)]
        decode: DecodeArgs,
    },
}

#[derive(Debug, clap::Args)]
struct DecodeArgs {
    /// Decode every sample-rate block instead of only the first
    #[arg(long)]
    all_rates: bool,
    /// Override the sample word format implied by the CFG
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Int16,
    Int32,
    Float32,
}

impl DecodeArgs {
    fn options(&self) -> DecodeOptions {
        let mut options = DecodeOptions::new();
        if self.all_rates {
            options = options.with_sample_count(SampleCountPolicy::AllRates);
        }
        if let Some(format) = self.format {
            options = options.with_sample_format(match format {
                FormatArg::Int16 => SampleFormat::Int16,
                FormatArg::Int32 => SampleFormat::Int32,
                FormatArg::Float32 => SampleFormat::Float32,
            });
        }
        options
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Info { cfg, json } => {
            let config = load_config(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_file_info(&cfg, &config);
            }
        }

        Commands::Decode {
            cfg,
            dat: dat_path,
            decode,
            scaled,
        } => {
            let config = load_config(&cfg)?;
            let data = fs::read(&dat_path)?;
            let options = decode.options();

            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write!(writer, "Sample")?;
            for ch in &config.analog_channels {
                write!(writer, ",{}", ch.name)?;
            }
            writeln!(writer)?;

            if scaled {
                let wave = dat::decode_scaled(&config, &data, &options)?;
                write_rows(&mut writer, wave.channels(), wave.sample_count())?;
            } else {
                let wave = dat::decode_with_options(&config, &data, &options)?;
                write_rows(&mut writer, wave.channels(), wave.sample_count())?;
            }
            writer.flush()?;
        }

        Commands::Channel {
            cfg,
            dat: dat_path,
            index,
            decode,
        } => {
            let config = load_config(&cfg)?;
            let data = fs::read(&dat_path)?;
            let wave = dat::decode_with_options(&config, &data, &decode.options())?;

            let samples = wave.channel(index).ok_or_else(|| {
                format!(
                    "channel {} not found (file has {} analog channels)",
                    index,
                    wave.channel_count()
                )
            })?;

            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            for value in samples {
                writeln!(writer, "{}", value)?;
            }
            writer.flush()?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Configuration, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    let config = Configuration::parse(&text)
        .map_err(|e| format!("loading CFG file '{}': {}", path.display(), e))?;
    info!("loaded {}", path.display());
    Ok(config)
}

fn write_rows<W: Write, T: std::fmt::Display>(
    writer: &mut W,
    channels: &[Vec<T>],
    samples: usize,
) -> io::Result<()> {
    for i in 0..samples {
        write!(writer, "{}", i)?;
        for channel in channels {
            write!(writer, ",{}", channel[i])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn print_file_info(path: &Path, config: &Configuration) {
    println!("COMTRADE Configuration");
    println!("======================");
    println!();
    println!("File: {}", path.display());
    println!("Station: {}", config.station_name);
    println!("Device: {}", config.device_id);
    println!("Revision: {}", config.revision_year);
    println!();

    println!(
        "Channels: {} ({} analog, {} digital)",
        config.channel_count, config.analog_channel_count, config.digital_channel_count
    );
    for ch in &config.analog_channels {
        println!(
            "  {:>3} {:<12} phase={:<3} unit={:<4} a={} b={} ratio={}/{} ({})",
            ch.index,
            ch.name,
            ch.phase,
            ch.unit,
            ch.a,
            ch.b,
            ch.primary,
            ch.secondary,
            ch.ratio_mode.as_str()
        );
    }
    println!();

    println!("Sampling:");
    println!("  Line frequency: {} Hz", config.line_frequency);
    for (i, rate) in config.sample_rates.iter().enumerate() {
        println!(
            "  Rate {}: {} Hz up to sample {}",
            i + 1,
            rate.rate,
            rate.end_sample
        );
    }
    println!("  Start: {}", config.start_time);
    println!("  Trigger: {}", config.trigger_time);
    println!();

    let format = config.sample_format();
    println!("Data Layout:");
    println!("  Data file type: {}", config.data_file_type);
    println!("  Sample format: {:?}", format);
    println!("  Record size: {} bytes", config.record_stride(format));
    println!("  Time factor: {}", config.time_factor);
}
