#[macro_use]
extern crate bitflags;

/// Read gas measurements from the analyzer's serial output.
pub mod analyzer;

/// Frame, pace and queue print jobs for a Niimbot B1 label printer.
pub mod printer;

/// Find the printer over Bluetooth LE and keep a session open to it.
pub mod ble;

/// Compose gas labels onto the printer's raster.
pub mod label;

/// Depth limits of breathing gases.
pub mod dive;

/// Diver names and the print log.
pub mod db;

pub mod config;

/// Rate limit for manual prints.
pub mod trigger;

/// The main loop tying analyzer, printer and database together.
pub mod station;

/// Terminal UI and the headless runner.
pub mod ui;

#[cfg(test)]
mod testing;
