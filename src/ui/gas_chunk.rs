use super::App;
use crate::dive::{Classification, GasMix, Narcosis};

use tui::{
    backend::Backend,
    layout::{Alignment, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};

fn caption(text: &str) -> Span<'_> {
    Span::styled(
        text,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

fn value(text: String, color: Color) -> Span<'static> {
    Span::styled(text, Style::default().fg(color).bg(Color::Black))
}

impl App {
    pub(super) fn draw_gas_chunk<B: Backend>(&mut self, frame: &mut Frame<B>, chunk: Rect) {
        // Build and render the block.
        let block = Block::default()
            .title("Gas")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .style(Style::default().fg(Color::LightBlue).bg(Color::Black));

        let inner_chunk = block.inner(chunk).inner(&Margin {
            horizontal: 1,
            vertical: 0,
        });

        frame.render_widget(block, chunk);

        // Without a reading, there is nothing to show but a hint.
        let (Some(reading), Some(label)) = (self.station.reading(), self.station.label()) else {
            let empty_paragraph = Paragraph::new("Waiting for the analyzer...")
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: true })
                .alignment(Alignment::Center);

            frame.render_widget(empty_paragraph, inner_chunk);

            return;
        };

        let mix = GasMix::new(reading.oxygen, reading.helium);

        let class_color = match mix.classification() {
            Classification::Hypoxic => Color::LightRed,
            Classification::OxygenRich => Color::LightMagenta,
            Classification::Air | Classification::Nitrox => Color::Green,
        };

        let end_color = match mix.narcosis() {
            Narcosis::Low => Color::Green,
            Narcosis::Moderate => Color::Yellow,
            Narcosis::High => Color::LightRed,
        };

        let name = if label.name.is_empty() {
            String::from("-")
        } else {
            label.name.clone()
        };

        let details = vec![
            Spans::from(vec![
                caption("O2: "),
                value(format!("{} %", label.oxygen), Color::Green),
                caption("   He: "),
                value(format!("{} %", label.helium), Color::Green),
            ]),
            Spans::from(vec![
                caption("MOD: "),
                value(format!("{} m", label.mod_m), Color::Green),
                caption("   END: "),
                value(format!("{:.0} m", mix.end_m()), end_color),
                caption("   Gas: "),
                value(format!("{:?}", mix.classification()), class_color),
            ]),
            Spans::from(vec![
                caption("Temperature: "),
                value(format!("{:.1} °C", reading.temperature), Color::DarkGray),
                caption("   Pressure: "),
                value(format!("{:.0} hPa", reading.pressure), Color::DarkGray),
            ]),
            Spans::from(vec![
                caption("Name: "),
                value(name, Color::Cyan),
                caption("   Date: "),
                value(label.date, Color::DarkGray),
            ]),
        ];

        let paragraph = Paragraph::new(details).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner_chunk);
    }
}
