// src/tui/mod.rs
use crate::types::{Direction, LedgerAction, MarketSnapshot, UiEvent};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction as LayoutDirection, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use rust_decimal::Decimal;
use std::{io, time::Duration};
use tokio::sync::mpsc;

pub struct App {
    pub symbol: String,
    pub snapshot: Option<MarketSnapshot>,
    pub position_pnl: Option<Decimal>,
    pub signals: Vec<String>,
    pub logs: Vec<String>,
}

impl App {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            snapshot: None,
            position_pnl: None,
            signals: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::SnapshotUpdate(snapshot) => {
                self.snapshot = Some(snapshot);
            }
            UiEvent::Signal(signal) => {
                if signal.direction != Direction::Neutral {
                    self.signals.push(format!(
                        "{:?} (strength {:.2}): {}",
                        signal.direction, signal.strength, signal.reason
                    ));
                }
            }
            UiEvent::Action(action) => match action {
                LedgerAction::Opened {
                    direction,
                    size,
                    entry_price,
                } => {
                    self.position_pnl = Some(Decimal::ZERO);
                    self.logs
                        .push(format!("OPENED {:?} {} @ {}", direction, size, entry_price));
                }
                LedgerAction::Closed {
                    direction,
                    exit_price,
                    pnl,
                    reason,
                    ..
                } => {
                    self.position_pnl = None;
                    self.logs.push(format!(
                        "CLOSED {:?} @ {} ({:?}), PnL {}",
                        direction, exit_price, reason, pnl
                    ));
                }
                LedgerAction::None => {}
            },
            UiEvent::PnlUpdate(pnl) => {
                self.position_pnl = Some(pnl);
            }
            UiEvent::Log(msg) => {
                self.logs.push(msg);
            }
        }
        if self.logs.len() > 20 {
            let overflow = self.logs.len() - 20;
            self.logs.drain(..overflow);
        }
    }
}

pub async fn run(mut rx: mpsc::Receiver<UiEvent>, symbol: String) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(symbol);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if let KeyCode::Char('q') = key.code {
                    break;
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            app.on_event(event);
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(10),
            ]
            .as_ref(),
        )
        .split(f.size());

    let market_text = match &app.snapshot {
        Some(s) => format!("${} | EMA ${} | RSI {:.1}", s.price, s.ema_short, s.rsi),
        None => "Waiting for data...".to_string(),
    };
    let pnl_text = match &app.position_pnl {
        Some(pnl) => format!("PnL {}", pnl),
        None => "Flat".to_string(),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("Crosshair [{}]", app.symbol),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(
            market_text,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(pnl_text, Style::default().fg(Color::Cyan)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(header, chunks[0]);

    let signals: Vec<ListItem> = app
        .signals
        .iter()
        .rev()
        .map(|s| {
            ListItem::new(Line::from(Span::styled(
                s.as_str(),
                Style::default().fg(Color::Green),
            )))
        })
        .collect();

    let signals_list = List::new(signals).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Signals History"),
    );
    f.render_widget(signals_list, chunks[1]);

    let logs: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .map(|s| ListItem::new(Line::from(Span::raw(s.as_str()))))
        .collect();

    let logs_list =
        List::new(logs).block(Block::default().borders(Borders::ALL).title("Trade Log"));
    f.render_widget(logs_list, chunks[2]);
}
