use std::io;
use std::io::Write;
use std::time::Duration;

use crossterm::cursor::Hide;
use crossterm::cursor::MoveTo;
use crossterm::cursor::Show;
use crossterm::event;
use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;
use crossterm::execute;
use crossterm::queue;
use crossterm::style::Attribute;
use crossterm::style::Color;
use crossterm::style::Print;
use crossterm::style::ResetColor;
use crossterm::style::SetAttribute;
use crossterm::style::SetForegroundColor;
use crossterm::terminal;
use crossterm::terminal::Clear;
use crossterm::terminal::ClearType;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use log::info;
use log::warn;

use crate::relay_engine::RelayEngine;
use crate::relay_engine::RelayView;
use crate::relay_engine::ToggleError;
use crate::relay_types::RelayId;
use crate::state_store::SnapshotStore;

const TITLE: &str = "Relay Control";
const HELP: &str = "Toggle: [1-4] | Quit: [q]";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Toggle(RelayId),
    Quit,
}

impl Command {
    pub fn from_key(key: &KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Command::Quit)
            }
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(Command::Quit),
            KeyCode::Char(c) => c
                .to_digit(10)
                .and_then(|n| RelayId::from_number(n as u8))
                .map(Command::Toggle),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn status_line(view: &RelayView) -> String {
    format!("Relay {} (GPIO {}): ", view.id, view.line)
}

pub fn indicator(view: &RelayView) -> (&'static str, Color) {
    match (&view.fault, view.logical_on) {
        (Some(_), _) => ("FAULT", Color::Yellow),
        (None, true) => ("ON", Color::Green),
        (None, false) => ("OFF", Color::Red),
    }
}

/// Turns operator commands into engine calls and draws the engine's view.
pub struct ControlLoop<'a, S: SnapshotStore> {
    engine: &'a mut RelayEngine<S>,
    message: Option<String>,
}

impl<'a, S: SnapshotStore> ControlLoop<'a, S> {
    pub fn new(engine: &'a mut RelayEngine<S>) -> ControlLoop<'a, S> {
        let message = engine.recovery().map(|recovery| recovery.to_string());
        ControlLoop { engine, message }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn handle(&mut self, command: Command) -> Flow {
        let id = match command {
            Command::Quit => return Flow::Quit,
            Command::Toggle(id) => id,
        };
        self.message = match self.engine.toggle(id) {
            Ok(_) => None,
            Err(ToggleError::Persistence(e)) => {
                warn!("Failed to toggle relay '{}'", id);
                Some(format!("Relay {} not toggled: {}", id, e))
            }
            Err(ToggleError::Hardware(fault)) => Some(fault.to_string()),
        };
        Flow::Continue
    }

    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        queue!(
            out,
            Clear(ClearType::All),
            MoveTo(0, 0),
            SetAttribute(Attribute::Bold),
            Print(TITLE),
            SetAttribute(Attribute::Reset),
            MoveTo(1, 2),
            Print(HELP)
        )?;

        for (row, view) in self.engine.views().iter().enumerate() {
            let (label, color) = indicator(view);
            queue!(
                out,
                MoveTo(2, 4 + row as u16),
                Print(status_line(view)),
                SetForegroundColor(color),
                SetAttribute(Attribute::Bold),
                Print(label),
                SetAttribute(Attribute::Reset),
                ResetColor
            )?;
        }

        if let Some(message) = &self.message {
            queue!(out, MoveTo(1, 9), Print(message))?;
        }
        out.flush()
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter<W: Write>(out: &mut W) -> io::Result<TerminalGuard> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(out, EnterAlternateScreen, Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Runs the interactive interface until the operator quits. Quitting leaves
/// every relay as it is.
pub fn run<S: SnapshotStore>(engine: &mut RelayEngine<S>) -> io::Result<()> {
    let mut stdout = io::stdout();
    let _guard = TerminalGuard::enter(&mut stdout)?;
    let mut control = ControlLoop::new(engine);
    let mut dirty = true;

    loop {
        if dirty {
            control.render(&mut stdout)?;
            dirty = false;
        }
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                if let Some(command) = Command::from_key(&key) {
                    if control.handle(command) == Flow::Quit {
                        info!("Quit key pressed, leaving relays as they are");
                        return Ok(());
                    }
                    dirty = true;
                }
            }
            Event::Resize(_, _) => dirty = true,
            _ => {}
        }
    }
}
