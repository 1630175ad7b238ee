use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Advertised name of the label printer.
pub const PRINTER_NAME: &str = "B1-H119122559";

/// Fixed hardware address of the label printer. Used for matching and as the fallback connect path.
pub const PRINTER_ADDRESS: &str = "19:01:12:F0:2F:4C";

/// USB signature of the FTDI bridge inside the analyzer.
pub const ANALYZER_VENDOR_ID: u16 = 0x0403;
pub const ANALYZER_PRODUCT_ID: u16 = 0x6001;

/// The analyzer talks 8N1 at this rate.
pub const ANALYZER_BAUD_RATE: u32 = 115_200;

/// Physical label stock: 50 x 30 mm at 203 dpi.
pub const LABEL_WIDTH_MM: f32 = 50.0;
pub const LABEL_HEIGHT_MM: f32 = 30.0;
pub const PRINTER_DPI: f32 = 203.0;

/// Print darkness (1..=5).
pub const PRINT_DENSITY: u8 = 3;

/// Keepalive period while a printer session is open.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A manual print trigger is accepted at most once per this interval.
pub const TRIGGER_INTERVAL: Duration = Duration::from_secs(2);

/// Main loop tick.
pub const TICK_RATE: Duration = Duration::from_millis(250);

/// Where the log goes while the terminal UI owns the screen.
pub const UI_LOG_FILE: &str = "gas-label-bridge.log";

/// Bridge an oxygen/helium analyzer to a BLE label printer.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Read the analyzer from a serial device node instead of talking to the FTDI chip over raw USB.
    #[arg(long)]
    pub serial_port: Option<String>,

    /// Advertised name of the printer to look for.
    #[arg(long, default_value = PRINTER_NAME)]
    pub printer_name: String,

    /// Hardware address of the printer to look for.
    #[arg(long, default_value = PRINTER_ADDRESS)]
    pub printer_address: String,

    /// Print darkness (1..=5).
    #[arg(long, default_value_t = PRINT_DENSITY, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub density: u8,

    /// The loaded stock is a continuous roll instead of labels with gaps.
    #[arg(long)]
    pub continuous: bool,

    /// Diver name to select (added to the name list if it is new).
    #[arg(long)]
    pub name: Option<String>,

    /// Name database (names, current selection and print log).
    #[arg(long, default_value = "labels.sqlite")]
    pub db: PathBuf,

    /// Font file for the label text. Without it, a system sans-serif face is used.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Font family to select from the loaded fonts.
    #[arg(long)]
    pub font_family: Option<String>,

    /// Use the built-in 5x7 bitmap font instead of an outline font.
    #[arg(long)]
    pub builtin_font: bool,

    /// Write every composed label as PNG to this path before printing.
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// Compose the demo label, write it to `--preview` and exit.
    #[arg(long, requires = "preview")]
    pub demo: bool,

    /// Run without the terminal UI. Status goes to the log.
    #[arg(long)]
    pub no_ui: bool,

    /// Log filter (same syntax as RUST_LOG). RUST_LOG wins if set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Append the log to this file instead of stderr. The terminal UI defaults to
    /// `gas-label-bridge.log`.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
