// tests/integration.rs
// Integration tests for COMTRADE Reader

use comtrade_reader::{
    dat, ComtradeError, Configuration, DecodeOptions, Recording, SampleCountPolicy,
};

/// Helper to build CFG text for a test recording
fn create_test_cfg(analog: usize, digital: usize, samples: u64, crlf: bool) -> String {
    let mut lines = vec![
        "SUBSTATION 12,DFR-1,1999".to_string(),
        format!("{},{}A,{}D", analog + digital, analog, digital),
    ];
    for i in 1..=analog {
        lines.push(format!(
            "{},I{},{},Feeder,A,{},{},0,-32768,32767,400,5,S",
            i,
            i,
            ["A", "B", "C"][(i - 1) % 3],
            0.5 * i as f64,
            -(i as f64)
        ));
    }
    for k in 1..=digital {
        lines.push(format!("{},BKR{},,,0", k, k));
    }
    lines.push("50".to_string());
    lines.push("1".to_string());
    lines.push(format!("2000,{}", samples));
    lines.push("05/06/2023,10:11:12.000500".to_string());
    lines.push("05/06/2023,10:11:12.050500".to_string());
    lines.push("BINARY".to_string());
    lines.push("1".to_string());

    let eol = if crlf { "\r\n" } else { "\n" };
    let mut text = lines.join(eol);
    text.push_str(eol);
    text
}

/// Helper to build a DAT buffer: sample `n` of channel `c` is `(n * 10 + c)` with sign flip on odd samples
fn create_test_dat(analog: usize, digital: usize, samples: u64) -> Vec<u8> {
    let words = (digital + 15) / 16;
    let mut data = Vec::new();
    for n in 0..samples as u32 {
        data.extend_from_slice(&(n + 1).to_le_bytes());
        data.extend_from_slice(&(n * 500).to_le_bytes());
        for c in 1..=analog {
            let mut value = (n * 10) as i16 + c as i16;
            if n % 2 == 1 {
                value = -value;
            }
            data.extend_from_slice(&value.to_le_bytes());
        }
        for _ in 0..words {
            data.extend_from_slice(&(n as u16 & 1).to_le_bytes());
        }
    }
    data
}

fn expected_sample(n: u64, c: usize) -> i64 {
    let mut raw = (n * 10) as f64 + c as f64;
    if n % 2 == 1 {
        raw = -raw;
    }
    (raw * 0.5 * c as f64 - c as f64) as i64
}

#[test]
fn test_parse_and_decode() {
    let cfg_text = create_test_cfg(3, 20, 100, false);
    let dat_bytes = create_test_dat(3, 20, 100);

    let config = Configuration::parse(&cfg_text).expect("Failed to parse CFG");
    assert_eq!(config.channel_count, 23);
    assert_eq!(config.analog_channel_count, 3);
    assert_eq!(config.digital_channels.len(), 20);
    assert_eq!(config.record_stride(config.sample_format()), 8 + 6 + 4);
    assert_eq!(dat_bytes.len(), 100 * 18);

    let waveform = dat::decode(&config, &dat_bytes).expect("Failed to decode DAT");
    assert_eq!(waveform.channel_count(), 3);
    assert_eq!(waveform.sample_count(), 100);

    for c in 1..=3 {
        let samples = waveform.channel(c).expect("Missing channel");
        for (n, &value) in samples.iter().enumerate() {
            assert_eq!(value, expected_sample(n as u64, c), "channel {} sample {}", c, n);
        }
    }
}

#[test]
fn test_crlf_recording() {
    let lf = Recording::from_parts(&create_test_cfg(2, 0, 10, false), &create_test_dat(2, 0, 10))
        .expect("Failed to load LF recording");
    let crlf = Recording::from_parts(&create_test_cfg(2, 0, 10, true), &create_test_dat(2, 0, 10))
        .expect("Failed to load CRLF recording");
    assert_eq!(lf, crlf);
}

#[test]
fn test_round_trip_then_decode() {
    let original = Configuration::parse(&create_test_cfg(4, 3, 8, true)).unwrap();
    let reparsed = Configuration::parse(&original.to_cfg_string()).unwrap();
    assert_eq!(reparsed, original);

    let data = create_test_dat(4, 3, 8);
    assert_eq!(
        dat::decode(&original, &data).unwrap(),
        dat::decode(&reparsed, &data).unwrap()
    );
}

#[test]
fn test_error_handling() {
    // Channel count mismatch
    let bad_counts = create_test_cfg(2, 0, 10, false).replace("2,2A,0D", "3,2A,0D");
    let err = Configuration::parse(&bad_counts).unwrap_err();
    assert!(err.to_string().starts_with("invalid channel count in line 2"));

    // Bad offset on the second analog channel
    let bad_field = create_test_cfg(2, 0, 10, false).replace(",1,-2,0,", ",1,minus two,0,");
    let err = Configuration::parse(&bad_field).unwrap_err();
    assert_eq!(err.to_string(), "invalid value b in line 4");

    // DAT too short for the declared sample count
    let config = Configuration::parse(&create_test_cfg(3, 0, 10, false)).unwrap();
    let mut data = create_test_dat(3, 0, 10);
    data.truncate(data.len() - 3);
    let result = dat::decode(&config, &data);
    assert!(matches!(result, Err(ComtradeError::TruncatedRecord { record: 9, .. })));
}

#[test]
fn test_multi_rate_policy() {
    let cfg_text = create_test_cfg(1, 0, 4, false).replace("1\n2000,4\n", "2\n2000,4\n1000,6\n");
    let config = Configuration::parse(&cfg_text).unwrap();
    assert_eq!(config.sample_rate_count, 2);

    let data = create_test_dat(1, 0, 6);
    let first = dat::decode(&config, &data).unwrap();
    assert_eq!(first.sample_count(), 4);

    let options = DecodeOptions::new().with_sample_count(SampleCountPolicy::AllRates);
    let all = dat::decode_with_options(&config, &data, &options).unwrap();
    assert_eq!(all.sample_count(), 6);
    assert_eq!(&all.channel(1).unwrap()[..4], first.channel(1).unwrap());
}

#[cfg(feature = "cli")]
mod cli {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::process::Command;

    fn write_pair(dir: &Path, analog: usize, samples: u64) -> (String, String) {
        let cfg = dir.join("rec.cfg");
        let dat = dir.join("rec.dat");
        fs::write(&cfg, create_test_cfg(analog, 0, samples, false)).unwrap();
        fs::write(&dat, create_test_dat(analog, 0, samples)).unwrap();
        (
            cfg.to_string_lossy().to_string(),
            dat.to_string_lossy().to_string(),
        )
    }

    fn run(args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_comtrade_reader"))
            .args(args)
            .output()
            .expect("Failed to run binary")
    }

    #[test]
    fn test_cli_decode_csv() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, dat) = write_pair(dir.path(), 2, 5);

        let output = run(&["decode", &cfg, &dat]);
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 6); // Header + 5 samples
        assert_eq!(lines[0], "Sample,I1,I2");
        assert_eq!(
            lines[2],
            format!("1,{},{}", expected_sample(1, 1), expected_sample(1, 2))
        );
    }

    #[test]
    fn test_cli_channel_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, dat) = write_pair(dir.path(), 3, 4);

        let output = run(&["channel", &cfg, &dat, "3"]);
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).unwrap();
        let values: Vec<i64> = stdout.lines().map(|l| l.parse().unwrap()).collect();
        let expected: Vec<i64> = (0..4).map(|n| expected_sample(n, 3)).collect();
        assert_eq!(values, expected);

        let output = run(&["info", &cfg, "--json"]);
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert!(stdout.contains("\"station_name\": \"SUBSTATION 12\""));
    }

    #[test]
    fn test_cli_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, dat) = write_pair(dir.path(), 1, 4);

        let output = run(&["channel", &cfg, &dat, "7"]);
        assert!(!output.status.success());

        let bad = dir.path().join("bad.cfg");
        fs::write(&bad, "This is not a CFG file").unwrap();
        let output = run(&["info", &bad.to_string_lossy()]);
        assert!(!output.status.success());
        let stderr = String::from_utf8(output.stderr).unwrap();
        assert!(stderr.contains("invalid cfg file"));

        let output = run(&["info", "non_existent.cfg"]);
        assert!(!output.status.success());
    }
}
