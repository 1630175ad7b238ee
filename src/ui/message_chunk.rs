use super::App;

use tui::{
    backend::Backend,
    layout::{Alignment, Margin, Rect},
    style::{Color, Style},
    text::{Span, Spans},
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
    Frame,
};

const KEY_HELP: &str = "[p] print  [s] scan  [d] disconnect  [n] next name  [q] quit";

impl App {
    pub(super) fn draw_message_chunk<B: Backend>(&mut self, frame: &mut Frame<B>, chunk: Rect) {
        // Build and render the block.
        let block = Block::default()
            .title("Messages")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .style(Style::default().fg(Color::Green).bg(Color::Black));

        let inner_chunk = block.inner(chunk).inner(&Margin {
            horizontal: 1,
            vertical: 0,
        });

        frame.render_widget(block, chunk);

        // The last message, then the key help.
        let lines = vec![
            Spans::from(Span::styled(
                self.station.message().to_owned(),
                Style::default().fg(Color::Green).bg(Color::Black),
            )),
            Spans::from(Span::styled(
                KEY_HELP,
                Style::default().fg(Color::DarkGray).bg(Color::Black),
            )),
        ];

        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center);

        frame.render_widget(paragraph, inner_chunk);
    }
}
