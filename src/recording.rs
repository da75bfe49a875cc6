// Recording Module
// A parsed configuration together with its decoded samples

use log::debug;

use crate::cfg::{AnalogChannel, Configuration};
use crate::dat::{self, DecodeOptions, DecodedWaveform};
use crate::error::Result;

/// Main COMTRADE reader: configuration plus decoded waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    pub config: Configuration,
    pub waveform: DecodedWaveform,
}

impl Recording {
    /// Parse CFG text and decode the matching DAT bytes with the default options.
    pub fn from_parts(cfg: &str, dat: &[u8]) -> Result<Self> {
        Self::from_parts_with_options(cfg, dat, &DecodeOptions::default())
    }

    pub fn from_parts_with_options(cfg: &str, dat: &[u8], options: &DecodeOptions) -> Result<Self> {
        let config = Configuration::parse(cfg)?;
        let waveform = dat::decode_with_options(&config, dat, options)?;
        debug!(
            "recording {}: {} channels x {} samples",
            config.station_name,
            waveform.channel_count(),
            waveform.sample_count()
        );
        Ok(Recording { config, waveform })
    }

    /// Channel declaration and samples by 1-based index.
    pub fn get_channel(&self, index: usize) -> Option<(&AnalogChannel, &[i64])> {
        let channel = self.config.analog_channel(index)?;
        let samples = self.waveform.channel(index)?;
        Some((channel, samples))
    }

    /// Find a channel by name.
    pub fn find_channel(&self, name: &str) -> Option<(&AnalogChannel, &[i64])> {
        let channel = self
            .config
            .analog_channels
            .iter()
            .find(|ch| ch.name == name)?;
        self.get_channel(channel.index as usize)
    }

    /// Time of each decoded sample in seconds from the first sample, derived from the
    /// sample-rate table. `None` if a rate block covering a sample has a non-positive rate.
    pub fn get_time_values(&self) -> Option<Vec<f64>> {
        let count = self.waveform.sample_count();
        let mut times = Vec::with_capacity(count);
        let mut t = 0.0;
        let mut rates = self.config.sample_rates.iter();
        let mut block = rates.next()?;

        for i in 0..count {
            while i as u64 >= block.end_sample {
                block = rates.next()?;
            }
            if block.rate <= 0.0 {
                return None;
            }
            times.push(t);
            t += 1.0 / block.rate;
        }

        Some(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::SampleCountPolicy;
    use crate::error::ComtradeError;

    const CFG: &str = "FEEDER,DFR,1999\n\
        2,2A,0D\n\
        1,IA,A,,A,0.5,0,0,-32768,32767,1,1,P\n\
        2,VA,A,,V,2,10,0,-32768,32767,1,1,P\n\
        50\n\
        2\n\
        1000,2\n\
        500,4\n\
        01/01/2020,00:00:00.000000\n\
        01/01/2020,00:00:00.001000\n\
        BINARY\n\
        1\n";

    fn dat(records: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..records {
            data.extend_from_slice(&(i as u32 + 1).to_le_bytes());
            data.extend_from_slice(&0u32.to_le_bytes());
            data.extend_from_slice(&(i as i16 * 4).to_le_bytes());
            data.extend_from_slice(&(-(i as i16)).to_le_bytes());
        }
        data
    }

    #[test]
    fn test_from_parts() {
        let rec = Recording::from_parts(CFG, &dat(4)).unwrap();

        assert_eq!(rec.waveform.sample_count(), 2);
        let (channel, samples) = rec.get_channel(2).unwrap();
        assert_eq!(channel.name, "VA");
        assert_eq!(samples, &[10, 8]);

        let (_, samples) = rec.find_channel("IA").unwrap();
        assert_eq!(samples, &[0, 2]);
        assert!(rec.find_channel("IB").is_none());
        assert!(rec.get_channel(3).is_none());
    }

    #[test]
    fn test_time_values() {
        let options = DecodeOptions::new().with_sample_count(SampleCountPolicy::AllRates);
        let rec = Recording::from_parts_with_options(CFG, &dat(4), &options).unwrap();

        let times = rec.get_time_values().unwrap();
        let expected = [0.0, 0.001, 0.002, 0.004];
        assert_eq!(times.len(), expected.len());
        for (i, (&actual, &expected)) in times.iter().zip(expected.iter()).enumerate() {
            assert!(
                (actual - expected).abs() < 1e-12,
                "Time value {} mismatch: {} != {}",
                i,
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            Recording::from_parts("not a cfg", &[]),
            Err(ComtradeError::TooFewLines(1))
        ));
        assert!(matches!(
            Recording::from_parts(CFG, &dat(1)),
            Err(ComtradeError::TruncatedRecord { .. })
        ));
    }
}
