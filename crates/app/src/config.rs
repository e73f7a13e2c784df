//! Command-line and environment configuration

use capture::PhysicalRect;
use clap::{Parser, Subcommand};
use export::ExportFormat;
use overlay::WindowHandle;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;

const ENV_HELP: &str = "\
Environment:
  REGIONCAP_OUTPUT_DIR  Directory for generated file names
  REGIONCAP_FORMAT      png or jpeg
  REGIONCAP_LOG         trace, debug, info, warn or error

Flags take precedence over the environment.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Parser, Debug)]
#[command(
    name = "regioncap",
    version,
    about = "Multi-monitor, mixed-DPI region screenshots",
    after_help = ENV_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Output file, or directory when it has no extension
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Image format: png or jpeg
    #[arg(short, long, global = true, value_parser = parse_format)]
    pub format: Option<ExportFormat>,

    /// Include the mouse cursor
    #[arg(long, global = true)]
    pub cursor: bool,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true, value_parser = parse_level)]
    pub log: Option<Level>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Select a region interactively (default)
    Region,
    /// Capture a physical desktop rectangle
    Rect {
        /// X,Y,W,H in physical pixels; X and Y may be negative
        #[arg(value_parser = parse_rect, allow_hyphen_values = true)]
        rect: PhysicalRect,
    },
    /// Capture the whole virtual desktop
    Screen,
    /// Capture one monitor (0 is the primary)
    Monitor { index: usize },
    /// Capture a top-level window by handle
    Window {
        /// Handle as listed by `windows`, hex (0x...) or decimal
        #[arg(value_parser = parse_handle)]
        handle: WindowHandle,
    },
    /// List top-level windows with their physical bounds
    Windows,
    /// List monitors with physical and logical bounds
    Monitors,
    /// Check physical/logical round trips on every monitor
    Verify,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub output_file: Option<PathBuf>,
    pub format: ExportFormat,
    pub show_cursor: bool,
    pub log_level: Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            output_file: None,
            format: ExportFormat::Png,
            show_cursor: false,
            log_level: Level::INFO,
        }
    }
}

impl AppConfig {
    /// Defaults, then the process environment, then `cli`.
    pub fn from_cli(cli: Cli) -> Result<(Self, Command), ConfigError> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    pub fn resolve(cli: Cli, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, Command), ConfigError> {
        let mut config = Self::default();
        config.apply_env(lookup)?;

        if let Some(path) = cli.output {
            if path.extension().is_some() {
                config.output_file = Some(path);
            } else {
                config.output_dir = path;
            }
        }

        // An explicit format wins over the output file's extension.
        match cli.format {
            Some(format) => config.format = format,
            None => {
                if let Some(format) = config.output_file.as_deref().and_then(ExportFormat::from_path) {
                    config.format = format;
                }
            }
        }

        config.show_cursor |= cli.cursor;
        if let Some(level) = cli.log {
            config.log_level = level;
        }

        Ok((config, cli.command.unwrap_or(Command::Region)))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, value: &str| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        };

        if let Some(dir) = lookup("REGIONCAP_OUTPUT_DIR").filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("REGIONCAP_FORMAT") {
            self.format = parse_format(&value).map_err(|_| invalid("REGIONCAP_FORMAT", &value))?;
        }
        if let Some(value) = lookup("REGIONCAP_LOG") {
            self.log_level = parse_level(&value).map_err(|_| invalid("REGIONCAP_LOG", &value))?;
        }
        Ok(())
    }

    /// Where the next capture is written.
    pub fn output_path(&self) -> PathBuf {
        match &self.output_file {
            Some(path) => path.clone(),
            None => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                self.output_dir
                    .join(format!("regioncap_{}.{}", &id[..8], self.format.extension()))
            }
        }
    }
}

/// `X,Y,W,H` in physical pixels; X and Y may be negative.
pub fn parse_rect(value: &str) -> Result<PhysicalRect, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        name: "rect",
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(invalid());
    };

    let rect = PhysicalRect::new(
        x.parse().map_err(|_| invalid())?,
        y.parse().map_err(|_| invalid())?,
        w.parse().map_err(|_| invalid())?,
        h.parse().map_err(|_| invalid())?,
    );
    if rect.is_empty() {
        return Err(invalid());
    }
    Ok(rect)
}

fn parse_handle(value: &str) -> Result<WindowHandle, ConfigError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => isize::from_str_radix(hex, 16),
        None => value.parse(),
    };

    parsed.map(WindowHandle).map_err(|_| ConfigError::InvalidValue {
        name: "window",
        value: value.to_string(),
    })
}

fn parse_format(value: &str) -> Result<ExportFormat, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: "format",
        value: value.to_string(),
    })
}

fn parse_level(value: &str) -> Result<Level, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: "log",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use std::collections::HashMap;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("regioncap").chain(args.iter().copied()))
    }

    fn resolve(args: &[&str]) -> (AppConfig, Command) {
        AppConfig::resolve(parse(args).unwrap(), |_| None).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_region() {
        let (config, command) = resolve(&[]);
        assert_eq!(command, Command::Region);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn parses_rect_with_negative_origin() {
        let (_, command) = resolve(&["rect", "-1280,0,640,480"]);
        assert_eq!(
            command,
            Command::Rect {
                rect: PhysicalRect::new(-1280, 0, 640, 480)
            }
        );
    }

    #[test]
    fn rejects_bad_rects() {
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("1,2,0,4").is_err());
        assert!(parse_rect("a,2,3,4").is_err());
        assert!(parse_rect("1,2,-3,4").is_err());

        let err = parse(&["rect", "1,2,3"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn monitor_index() {
        let (_, command) = resolve(&["monitor", "1"]);
        assert_eq!(command, Command::Monitor { index: 1 });

        assert_eq!(parse(&["monitor", "x"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(
            parse(&["monitor"]).unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn window_handles_in_hex_or_decimal() {
        let (_, command) = resolve(&["window", "0x3a00007"]);
        assert_eq!(
            command,
            Command::Window {
                handle: WindowHandle(0x3a00007)
            }
        );

        let (_, command) = resolve(&["window", "131242"]);
        assert_eq!(
            command,
            Command::Window {
                handle: WindowHandle(131242)
            }
        );

        assert_eq!(parse(&["window", "0xzz"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(resolve(&["windows"]).1, Command::Windows);
    }

    #[test]
    fn flags_override_environment() {
        let env: HashMap<&str, &str> = [
            ("REGIONCAP_OUTPUT_DIR", "/tmp/shots"),
            ("REGIONCAP_FORMAT", "jpeg"),
            ("REGIONCAP_LOG", "debug"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let (config, _) = AppConfig::resolve(parse(&[]).unwrap(), lookup).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.format, ExportFormat::Jpeg);
        assert_eq!(config.log_level, Level::DEBUG);

        let cli = parse(&["screen", "--format", "png", "--cursor", "--log", "warn"]).unwrap();
        let (config, command) = AppConfig::resolve(cli, lookup).unwrap();
        assert_eq!(command, Command::Screen);
        assert_eq!(config.format, ExportFormat::Png);
        assert_eq!(config.log_level, Level::WARN);
        assert!(config.show_cursor);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/shots"));
    }

    #[test]
    fn invalid_environment_format() {
        let result = AppConfig::resolve(parse(&[]).unwrap(), |key| {
            (key == "REGIONCAP_FORMAT").then(|| "bmp".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: "REGIONCAP_FORMAT", .. })
        ));
    }

    #[test]
    fn output_file_sets_format() {
        let (config, _) = resolve(&["-o", "out/shot.jpg", "screen"]);
        assert_eq!(config.format, ExportFormat::Jpeg);
        assert_eq!(config.output_path(), PathBuf::from("out/shot.jpg"));

        let (config, _) = resolve(&["-o", "out/shot.jpg", "-f", "png"]);
        assert_eq!(config.format, ExportFormat::Png);
    }

    #[test]
    fn output_directory_gets_generated_name() {
        let (config, _) = resolve(&["--output", "captures"]);
        let path = config.output_path();
        assert_eq!(path.parent(), Some(std::path::Path::new("captures")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("regioncap_") && name.ends_with(".png"), "{name}");
    }

    #[test]
    fn unknown_flags_are_reported_as_flags() {
        assert_eq!(parse(&["-x"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert_eq!(parse(&["--bogus"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert_eq!(parse(&["screen", "-x"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn rejects_unknown_commands_and_extra_arguments() {
        assert_eq!(parse(&["record"]).unwrap_err().kind(), ErrorKind::InvalidSubcommand);
        assert_eq!(parse(&["screen", "extra"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert_eq!(
            parse(&["--output"]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn help_is_handled_by_the_parser() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["screen", "--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
    }
}
