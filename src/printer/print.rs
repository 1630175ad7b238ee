use super::{is_page_complete, Error, LabelBitmap, LabelType, Printer, Request, PAGE_COMPLETE};

use std::thread;
use std::time::Duration;

use crate::config::PRINT_DENSITY;

/// A run of blank rows is sent as one packet of at most this many rows.
const MAX_EMPTY_RUN: u32 = u8::MAX as u32;

/// Protocol parameters and the pacing the printer needs to keep up.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintConfig {
    pub density: u8,
    pub label_type: LabelType,

    /// How long to wait for the answer to an acknowledged command.
    pub ack_timeout: Duration,

    /// Pause after density and label type.
    pub setup_delay: Duration,

    /// Pause after print start, page start and page size.
    pub page_delay: Duration,

    /// Pause after a run of blank rows.
    pub empty_row_delay: Duration,

    /// Pause after a bitmap row. Grows with the number of consecutive bitmap rows.
    pub row_delay: Duration,
    pub row_delay_after_10: Duration,
    pub row_delay_after_20: Duration,

    /// Extra pause after every `burst_rows` consecutive bitmap rows.
    pub burst_rows: u32,
    pub burst_pause: Duration,

    /// Pause when the printer reports a flushed page mid-stream, and around page end.
    pub settle_delay: Duration,

    /// How long to wait for the page-complete notification after the last row.
    pub completion_timeout: Duration,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            density: PRINT_DENSITY,
            label_type: LabelType::WithGaps,
            ack_timeout: Duration::from_millis(500),
            setup_delay: Duration::from_millis(50),
            page_delay: Duration::from_millis(100),
            empty_row_delay: Duration::from_millis(5),
            row_delay: Duration::from_millis(10),
            row_delay_after_10: Duration::from_millis(20),
            row_delay_after_20: Duration::from_millis(25),
            burst_rows: 50,
            burst_pause: Duration::from_millis(200),
            settle_delay: Duration::from_millis(1500),
            completion_timeout: Duration::from_secs(15),
        }
    }
}

impl PrintConfig {
    fn row_delay(&self, consecutive_rows: u32) -> Duration {
        match consecutive_rows {
            21.. => self.row_delay_after_20,
            11..=20 => self.row_delay_after_10,
            _ => self.row_delay,
        }
    }
}

/// What went over the wire for one label.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrintReport {
    pub empty_row_packets: usize,
    pub bitmap_row_packets: usize,

    /// `false` if the page-complete notification never came.
    pub confirmed: bool,
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

impl Printer {
    /// Run the complete print sequence for one label. The first failing step aborts it.
    pub fn print(&self, bitmap: &LabelBitmap) -> Result<PrintReport, Error> {
        let (width, height) = (bitmap.width(), bitmap.height());

        let (Ok(page_width), Ok(page_height)) = (u16::try_from(width), u16::try_from(height))
        else {
            return Err(Error::InvalidLabel { width, height });
        };

        log::info!("Printing {width}x{height} label.");

        self.send_and_wait(&Request::SetDensity(self.config.density))?;
        pause(self.config.setup_delay);

        self.send_and_wait(&Request::SetLabelType(self.config.label_type))?;
        pause(self.config.setup_delay);

        self.send_and_wait(&Request::PrintStart)?;
        pause(self.config.page_delay);

        self.send_and_wait(&Request::PageStart)?;
        pause(self.config.page_delay);

        self.send_and_wait(&Request::SetPageSize {
            width: page_width,
            height: page_height,
        })?;
        pause(self.config.page_delay);

        let mut report = self.stream_rows(bitmap)?;

        // Wait for the printer to report the finished page. Some firmware never sends it.
        self.responses.clear();

        report.confirmed = self
            .responses
            .wait_for(self.config.completion_timeout, is_page_complete)
            .is_some();

        if !report.confirmed {
            log::warn!("No page-complete notification ({PAGE_COMPLETE:#04x}), ending the page anyway.");
        }

        pause(self.config.settle_delay);
        self.send_and_wait(&Request::PageEnd)?;

        pause(self.config.settle_delay);
        self.send_and_wait(&Request::PrintEnd)?;

        log::info!(
            "Label sent ({} bitmap rows, {} blank runs).",
            report.bitmap_row_packets,
            report.empty_row_packets
        );

        Ok(report)
    }

    fn stream_rows(&self, bitmap: &LabelBitmap) -> Result<PrintReport, Error> {
        let height = bitmap.height();
        let mut report = PrintReport::default();
        let mut consecutive_rows = 0;
        let mut row = 0;

        while row < height {
            if bitmap.is_row_blank(row) {
                // Collapse the run of blank rows.
                let mut count = 1;

                while row + count < height && count < MAX_EMPTY_RUN && bitmap.is_row_blank(row + count) {
                    count += 1;
                }

                self.send(&Request::PrintEmptyRows {
                    row: row as u16,
                    count: count as u8,
                })?;

                report.empty_row_packets += 1;
                consecutive_rows = 0;
                row += count;

                pause(self.config.empty_row_delay);
            } else {
                self.send(&Request::PrintBitmapRow {
                    row: row as u16,
                    repeat: 1,
                    data: bitmap.row(row),
                })?;

                report.bitmap_row_packets += 1;
                consecutive_rows += 1;
                row += 1;

                pause(self.config.row_delay(consecutive_rows));

                if self.config.burst_rows > 0 && consecutive_rows % self.config.burst_rows == 0 {
                    pause(self.config.burst_pause);
                }
            }

            // The printer flushed its buffer; give it time before continuing.
            if self.responses.take().is_some_and(|frame| is_page_complete(&frame)) {
                log::debug!("Printer reported a flushed page at row {row}.");
                pause(self.config.settle_delay);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::{frame, ResponseSlot, Transport};
    use crate::testing::{print_config, FakeTransport};

    use std::sync::Arc;
    use std::time::Instant;

    use pretty_assertions::assert_eq;

    fn printer(transport: FakeTransport, responses: Arc<ResponseSlot>) -> (Printer, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let printer = Printer::new(Arc::clone(&transport) as Arc<dyn Transport>, responses, print_config());

        (printer, transport)
    }

    /// Blank rows 0-2, black rows 3 and 4, blank rows 5-9.
    fn striped_label() -> LabelBitmap {
        let mut bitmap = LabelBitmap::new(16, 10);
        bitmap.fill_rect(0, 3, 16, 2);
        bitmap
    }

    #[test]
    fn command_order() {
        let bitmap = striped_label();
        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(
            FakeTransport::new(Arc::clone(&responses)).confirming_pages(bitmap.height()),
            responses,
        );

        let report = printer.print(&bitmap).unwrap();

        assert_eq!(
            report,
            PrintReport {
                empty_row_packets: 2,
                bitmap_row_packets: 2,
                confirmed: true,
            }
        );

        assert_eq!(
            transport.commands(),
            vec![0x21, 0x23, 0x01, 0x03, 0x13, 0x84, 0x85, 0x85, 0x84, 0xe3, 0xf3]
        );

        // Blank run at the top: row 0, three rows.
        let packets = transport.packets();
        assert_eq!(&packets[5][4..7], &[0x00, 0x00, 0x03]);

        // Black row on the wire: all ones.
        assert_eq!(&packets[6][4..12], &[0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0xff, 0xff]);
    }

    #[test]
    fn unconfirmed_page_still_ends() {
        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(FakeTransport::new(Arc::clone(&responses)), responses);

        let printer = Printer {
            config: PrintConfig {
                completion_timeout: Duration::from_millis(30),
                ..print_config()
            },
            ..printer
        };

        let report = printer.print(&striped_label()).unwrap();

        assert!(!report.confirmed);
        assert_eq!(transport.commands().last(), Some(&0xf3));
    }

    #[test]
    fn missing_ack_aborts() {
        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(FakeTransport::new(Arc::clone(&responses)).silent(), responses);

        let err = printer.print(&striped_label()).unwrap_err();

        assert!(matches!(err, Error::NoAcknowledgement(crate::printer::Command::SetDensity)));
        assert_eq!(transport.commands(), vec![0x21]);
    }

    #[test]
    fn oversized_label_is_rejected() {
        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(FakeTransport::new(Arc::clone(&responses)), responses);

        let err = printer.print(&LabelBitmap::new(8, 70_000)).unwrap_err();

        assert!(matches!(err, Error::InvalidLabel { .. }));
        assert!(transport.packets().is_empty());
    }

    /// `(row, count)` of every blank-run packet.
    fn blank_runs(transport: &FakeTransport) -> Vec<(u16, u8)> {
        transport
            .packets()
            .iter()
            .filter(|packet| packet[2] == 0x84)
            .map(|packet| (u16::from_be_bytes([packet[4], packet[5]]), packet[6]))
            .collect()
    }

    #[test]
    fn leading_blank_rows_are_one_packet() {
        let mut bitmap = LabelBitmap::new(16, 11);
        bitmap.fill_rect(0, 10, 16, 1);

        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(FakeTransport::new(Arc::clone(&responses)), responses);

        printer.stream_rows(&bitmap).unwrap();

        assert_eq!(transport.commands(), vec![0x84, 0x85]);
        assert_eq!(blank_runs(&transport), vec![(0, 10)]);
        assert_eq!(&transport.packets()[1][4..6], &[0x00, 0x0a]);
    }

    #[test]
    fn blank_runs_are_capped() {
        let responses = Arc::new(ResponseSlot::new());
        let (printer, transport) = printer(FakeTransport::new(Arc::clone(&responses)), responses);

        let report = printer.stream_rows(&LabelBitmap::new(16, 600)).unwrap();

        assert_eq!(report.empty_row_packets, 3);
        assert_eq!(blank_runs(&transport), vec![(0, 255), (255, 255), (510, 90)]);
    }

    #[test]
    fn flushed_page_mid_stream_settles() {
        let settle = Duration::from_millis(150);
        let responses = Arc::new(ResponseSlot::new());
        let (printer, _transport) = printer(FakeTransport::new(Arc::clone(&responses)), Arc::clone(&responses));

        let printer = Printer {
            config: PrintConfig {
                settle_delay: settle,
                ..print_config()
            },
            ..printer
        };

        let start = Instant::now();
        printer.stream_rows(&striped_label()).unwrap();
        assert!(start.elapsed() < settle);

        responses.deliver(&frame(PAGE_COMPLETE, &[0x01]).unwrap());

        let start = Instant::now();
        printer.stream_rows(&striped_label()).unwrap();
        assert!(start.elapsed() >= settle);

        // Consumed by the first pause.
        assert!(responses.take().is_none());
    }

    #[test]
    fn row_delay_steps() {
        let config = PrintConfig::default();

        assert_eq!(config.row_delay(1), Duration::from_millis(10));
        assert_eq!(config.row_delay(10), Duration::from_millis(10));
        assert_eq!(config.row_delay(11), Duration::from_millis(20));
        assert_eq!(config.row_delay(21), Duration::from_millis(25));
    }
}
