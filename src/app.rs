use crate::optimizer::OptimalPortfolio;
use crate::portfolio::FrontierReport;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io;

/// Which optimal portfolio the details panel shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    MaxSharpe,
    MinVolatility,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub report: FrontierReport,
}

impl App {
    pub fn new(report: FrontierReport) -> Self {
        Self {
            should_quit: false,
            state: AppState::MaxSharpe,
            report,
        }
    }

    pub fn selected(&self) -> &OptimalPortfolio {
        match self.state {
            AppState::MaxSharpe => &self.report.max_sharpe,
            AppState::MinVolatility => &self.report.min_volatility,
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab => {
                self.state = match self.state {
                    AppState::MaxSharpe => AppState::MinVolatility,
                    AppState::MinVolatility => AppState::MaxSharpe,
                };
            }
            _ => {}
        }
    }

    pub fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }
}
