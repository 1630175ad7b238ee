use crate::config::TICK_RATE;
use crate::station::Station;

use std::error::Error;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};

use tui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};

mod gas_chunk;

mod message_chunk;

mod status_chunk;

/// Without the terminal UI, a status line is logged this often.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// What a key press (or a line on stdin) asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Action {
    Print,
    Scan,
    Disconnect,
    NextName,
    Quit,
}

impl Action {
    fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'p' => Some(Action::Print),
            's' => Some(Action::Scan),
            'd' => Some(Action::Disconnect),
            'n' => Some(Action::NextName),
            'q' => Some(Action::Quit),
            _ => None,
        }
    }

    /// Full words work too on stdin ("print", "scan", ...).
    fn from_line(line: &str) -> Option<Self> {
        line.trim().chars().next().and_then(Self::from_key)
    }
}

pub struct App {
    station: Station,
    now: Instant,
}

impl App {
    pub fn new(station: Station) -> Self {
        Self {
            station,
            now: Instant::now(),
        }
    }

    fn on_startup(&mut self) {
        // Look for the printer right away; the link connects on its own once it is found.
        if let Err(err) = self.station.scan() {
            log::error!("Failed to start the printer scan: {err}");
        }
    }

    fn on_tick(&mut self) {
        self.station.tick(self.now);
    }

    /// Returns `false` once the app should quit.
    fn perform(&mut self, action: Action) -> bool {
        // Failures already ended up in the station's message line.
        let result = match action {
            Action::Print => self.station.manual_print(self.now),
            Action::Scan => self.station.scan(),
            Action::Disconnect => self.station.disconnect(),
            Action::NextName => self.station.cycle_name(),
            Action::Quit => return false,
        };

        if let Err(err) = result {
            log::debug!("{action:?} rejected: {err}");
        }

        true
    }

    fn run_in_terminal<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> Result<(), Box<dyn Error>> {
        self.on_startup();

        let mut last_tick = Instant::now();

        loop {
            self.now = Instant::now();
            let time_since_last_tick = self.now.saturating_duration_since(last_tick);

            // Draw the UI.
            terminal.draw(|frame| self.draw_ui(frame))?;

            // Poll the terminal for events.
            // Make sure that we don't miss the next tick.
            let timeout = TICK_RATE.saturating_sub(time_since_last_tick);

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    let action = match key.code {
                        KeyCode::Char(c) => Action::from_key(c),
                        KeyCode::Enter => Some(Action::Print),
                        KeyCode::Esc => Some(Action::Quit),
                        _ => None,
                    };

                    if let Some(action) = action {
                        if !self.perform(action) {
                            return Ok(());
                        }
                    }
                }
            }

            if time_since_last_tick >= TICK_RATE {
                self.on_tick();
                last_tick = self.now;
            }
        }
    }

    fn draw_ui<B: Backend>(&mut self, frame: &mut Frame<B>) {
        // Gas on top, then the status lines and the message line.
        let vert_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Min(8),
                    Constraint::Length(4),
                    Constraint::Length(4),
                ]
                .as_ref(),
            )
            .split(frame.size());

        self.draw_gas_chunk(frame, vert_chunks[0]);
        self.draw_status_chunk(frame, vert_chunks[1]);
        self.draw_message_chunk(frame, vert_chunks[2]);
    }

    /// Run with the terminal UI until the operator quits.
    pub fn run(station: Station) -> Result<(), Box<dyn Error>> {
        let mut app = App::new(station);

        // Configure the terminal.
        enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

        // Instantiate TUI.
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Run the app.
        let result = app.run_in_terminal(&mut terminal);

        // Restore the terminal.
        disable_raw_mode()?;

        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;

        terminal.show_cursor()?;

        result
    }

    /// Run without a terminal UI. Commands are read line by line from stdin, status goes to the
    /// log. Ends on `q`. A closed stdin only stops the commands.
    pub fn run_headless(station: Station) -> Result<(), Box<dyn Error>> {
        let mut app = App::new(station);
        let mut lines = Some(spawn_stdin_reader()?);

        app.on_startup();

        let mut last_status = Instant::now();

        loop {
            app.now = Instant::now();
            app.on_tick();

            match lines.as_ref().map(Receiver::try_recv) {
                Some(Ok(line)) => {
                    if let Some(action) = Action::from_line(&line) {
                        if !app.perform(action) {
                            return Ok(());
                        }
                    }
                }

                Some(Err(TryRecvError::Disconnected)) => {
                    log::info!("Stdin closed, no more commands.");
                    lines = None;
                }

                Some(Err(TryRecvError::Empty)) | None => {}
            }

            if app.now.saturating_duration_since(last_status) >= STATUS_LOG_INTERVAL {
                app.log_status();
                last_status = app.now;
            }

            thread::sleep(TICK_RATE);
        }
    }

    fn log_status(&self) {
        let link = self.station.link_status();

        match self.station.reading() {
            Some(reading) => log::info!(
                "O2 {:.1} % He {:.1} % | printer {:?} ({}) | {} job(s) sent",
                reading.oxygen,
                reading.helium,
                link.state,
                link.message,
                self.station.jobs_queued()
            ),

            None => log::info!(
                "No reading yet | printer {:?} ({}) | {} job(s) sent",
                link.state,
                link.message,
                self.station.jobs_queued()
            ),
        }
    }
}

fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (sender, receiver) = mpsc::channel();

    thread::Builder::new()
        .name(String::from("stdin"))
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };

                if sender.send(line).is_err() {
                    break;
                }
            }
        })?;

    Ok(receiver)
}
