use super::App;
use crate::ble::ConnectionState;
use crate::printer::PrintOutcome;

use tui::{
    backend::Backend,
    layout::{Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};

impl App {
    pub(super) fn draw_status_chunk<B: Backend>(&mut self, frame: &mut Frame<B>, chunk: Rect) {
        // Build and render the block.
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .style(Style::default().fg(Color::DarkGray).bg(Color::Black));

        let inner_chunk = block.inner(chunk).inner(&Margin {
            horizontal: 1,
            vertical: 0,
        });

        frame.render_widget(block, chunk);

        let caption_style = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);

        // Build the status line.
        let mut status = Vec::with_capacity(2);

        // Analyzer
        let (analyzer_str, analyzer_color) = if self.station.analyzer_connected() {
            ("connected", Color::Green)
        } else {
            ("waiting", Color::LightRed)
        };

        status.push(Spans::from(vec![
            Span::styled("Analyzer: ", caption_style),
            Span::styled(
                analyzer_str,
                Style::default().fg(analyzer_color).bg(Color::Black),
            ),
        ]));

        // Printer
        let link = self.station.link_status();

        let link_color = match link.state {
            ConnectionState::Connected => Color::Green,
            ConnectionState::Failed | ConnectionState::Disconnected => Color::LightRed,
            _ => Color::Yellow,
        };

        let mut printer = vec![
            Span::styled("Printer: ", caption_style),
            Span::styled(link.message, Style::default().fg(link_color).bg(Color::Black)),
        ];

        if self.station.printer_busy() {
            printer.push(Span::styled(
                " (printing)",
                Style::default().fg(Color::Yellow).bg(Color::Black),
            ));
        }

        printer.push(Span::styled("   Labels: ", caption_style));
        printer.push(Span::styled(
            self.station.jobs_queued().to_string(),
            Style::default().fg(Color::DarkGray).bg(Color::Black),
        ));

        if let Some(PrintOutcome::Failed(err)) = self.station.last_outcome() {
            printer.push(Span::styled(
                format!("   Last print failed: {err}"),
                Style::default().fg(Color::LightRed).bg(Color::Black),
            ));
        }

        status.push(Spans::from(printer));

        let paragraph = Paragraph::new(status).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner_chunk);
    }
}
