//! Command-line argument parsing for the DRO player.
//!
//! Flags:
//! - `--mode <opl2|dual-opl2|opl3|esfm>` overrides the card stored in the capture
//! - `--rate <hz>` output sample rate
//! - `--config <file.json>` device configuration file
//! - `--wav <file.wav>` render to a file instead of the speakers

use std::env;

use opl::OplMode;

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    /// DRO file to play
    pub file_path: Option<String>,
    /// Card override
    pub mode: Option<OplMode>,
    /// Output sample rate override
    pub sample_rate: Option<u32>,
    /// JSON device configuration
    pub config_path: Option<String>,
    /// Render to this WAV file instead of playing
    pub wav_path: Option<String>,
    /// Normalize the rendered WAV
    pub normalize: bool,
    /// Fade-out length in seconds for the rendered WAV
    pub fade_out: f32,
    /// Remove DC bias from the output
    pub remove_dc: bool,
    /// Whether help was requested
    pub show_help: bool,
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    /// Parse an argument list (without the program name).
    pub fn parse_from<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut args = Self::default();
        let mut iter = iter.into_iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if arg.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };
            match flag.as_str() {
                "--help" | "-h" => args.show_help = true,
                "--normalize" => args.normalize = true,
                "--remove-dc" => args.remove_dc = true,
                "--mode" | "--rate" | "--config" | "--wav" | "--fade" => {
                    let Some(value) = inline.or_else(|| iter.next()) else {
                        eprintln!("{flag} requires an argument");
                        args.show_help = true;
                        continue;
                    };
                    args.apply_value(&flag, &value);
                }
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {arg}");
                    args.show_help = true;
                }
                _ => args.file_path = Some(arg),
            }
        }

        args
    }

    fn apply_value(&mut self, flag: &str, value: &str) {
        match flag {
            "--mode" => match OplMode::from_name(value) {
                Some(mode) => self.mode = Some(mode),
                None => {
                    eprintln!("Unknown mode: {value}");
                    self.show_help = true;
                }
            },
            "--rate" => match value.parse() {
                Ok(rate) => self.sample_rate = Some(rate),
                Err(_) => {
                    eprintln!("Invalid sample rate: {value}");
                    self.show_help = true;
                }
            },
            "--fade" => match value.parse::<f32>() {
                Ok(secs) if secs >= 0.0 => self.fade_out = secs,
                _ => {
                    eprintln!("Invalid fade-out length: {value}");
                    self.show_help = true;
                }
            },
            "--config" => self.config_path = Some(value.to_string()),
            "--wav" => self.wav_path = Some(value.to_string()),
            _ => {}
        }
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  dro-player [flags] <capture.dro>\n\n\
             Flags:\n\
             \x20 --mode <mode>        Card to emulate (opl2, dual-opl2, opl3, esfm);\n\
             \x20                      defaults to the hardware stored in the capture\n\
             \x20 --rate <hz>          Output sample rate (default 49716)\n\
             \x20 --config <file>      JSON device configuration\n\
             \x20 --remove-dc          Remove DC bias from the output\n\
             \x20 --wav <file>         Render to a WAV file instead of playing\n\
             \x20 --normalize          Normalize the rendered WAV\n\
             \x20 --fade <secs>        Fade out the end of the rendered WAV\n\
             \x20 -h, --help           Show this help\n\n\
             Examples:\n\
             \x20 dro-player opl_capture_0000.dro\n\
             \x20 dro-player --rate 44100 --wav song.wav --fade 2 song.dro\n"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_file_only() {
        let args = parse(&["song.dro"]);
        assert_eq!(args.file_path.as_deref(), Some("song.dro"));
        assert!(!args.show_help);
        assert_eq!(args.mode, None);
    }

    #[test]
    fn test_separate_and_inline_values() {
        let args = parse(&["--mode", "dual-opl2", "--rate=44100", "--wav", "out.wav", "a.dro"]);
        assert_eq!(args.mode, Some(OplMode::DualOpl2));
        assert_eq!(args.sample_rate, Some(44100));
        assert_eq!(args.wav_path.as_deref(), Some("out.wav"));
        assert_eq!(args.file_path.as_deref(), Some("a.dro"));
    }

    #[test]
    fn test_bad_values_request_help() {
        assert!(parse(&["--mode", "opl4"]).show_help);
        assert!(parse(&["--rate", "fast"]).show_help);
        assert!(parse(&["--fade"]).show_help);
        assert!(parse(&["--loud"]).show_help);
    }

    #[test]
    fn test_switches() {
        let args = parse(&["--normalize", "--remove-dc", "--fade", "1.5", "x.dro"]);
        assert!(args.normalize);
        assert!(args.remove_dc);
        assert_eq!(args.fade_out, 1.5);
    }
}
