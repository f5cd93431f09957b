//! Terminal UI for a mesh node.
//!
//! Responsibilities:
//! - render dispatched chat lines and peer notices with a scrollbar
//! - collect a line of input and hand it to the command executor
//! - leave on Esc, `/quit`, or when the node stops
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind, MouseEventKind};
use crossterm::{cursor, execute, terminal};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use ratatui::{prelude::*, widgets::*};
use std::io::{self, stdout};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::commands::{self, Command, Reply};
use crate::node::Node;
use crate::types::{format_time, Event};

const ACCENT: Color = Color::Rgb(50, 230, 230);
const TEXT: Color = Color::Rgb(200, 200, 210);
const BACKGROUND: Color = Color::Rgb(20, 18, 28);

#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub sender: String,
    pub text: String,
    pub time: String,
}

impl ChatLine {
    fn system(text: impl Into<String>) -> Self {
        Self { sender: "System".to_string(), text: text.into(), time: format_time(&chrono::Local::now()) }
    }

    pub fn from_event(event: &Event) -> Self {
        match event {
            Event::Chat(msg) => Self {
                sender: msg.sender().to_string(),
                text: msg.content().to_string(),
                time: format_time(&msg.timestamp()),
            },
            other => {
                let line = other.display_line();
                Self::system(line.trim_start_matches("[SYSTEM] "))
            }
        }
    }
}

#[derive(Default)]
struct ViewState {
    lines: Vec<ChatLine>,
    input: String,
    scroll: usize,
    follow: bool,
}

/// Run the chat screen in the calling thread until the user leaves.
pub fn run(node: &mut Node) -> io::Result<()> {
    let feed: Arc<Mutex<Vec<ChatLine>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&feed);
    node.spawn_dispatcher(move |event| {
        sink.lock().unwrap_or_else(|e| e.into_inner()).push(ChatLine::from_event(&event));
    })
    .map_err(io::Error::other)?;
    feed.lock().unwrap_or_else(|e| e.into_inner()).push(ChatLine::system(format!(
        "Listening on {} as {}. Type /help for commands.",
        node.local_addr(),
        node.config().username
    )));

    terminal::enable_raw_mode()?;
    let _restore = Restore(restore_terminal);
    execute!(stdout(), terminal::EnterAlternateScreen, event::EnableMouseCapture)?;
    let mut term = Terminal::new(CrosstermBackend::new(stdout()))?;
    event_loop(&mut term, node, &feed)
}

/// Runs its closure when dropped, so every exit from `run` after raw mode
/// was switched on puts the terminal back.
struct Restore<F: FnMut()>(F);

impl<F: FnMut()> Drop for Restore<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}

fn restore_terminal() {
    let _ = execute!(stdout(), event::DisableMouseCapture, terminal::LeaveAlternateScreen, cursor::Show);
    let _ = terminal::disable_raw_mode();
}

fn event_loop(
    term: &mut Terminal<CrosstermBackend<io::Stdout>>,
    node: &Node,
    feed: &Arc<Mutex<Vec<ChatLine>>>,
) -> io::Result<()> {
    let mut state = ViewState { follow: true, ..ViewState::default() };
    while node.is_running() {
        state.lines = feed.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let peers = node.registry().live_count();
        term.draw(|f| draw(f, &mut state, node, peers))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            TermEvent::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Esc => break,
                KeyCode::Up => scroll_up(&mut state),
                KeyCode::Down => state.scroll += 1,
                KeyCode::Char(c) => state.input.push(c),
                KeyCode::Backspace => {
                    state.input.pop();
                }
                KeyCode::Enter => {
                    let input = std::mem::take(&mut state.input);
                    if submit(node, feed, &input) {
                        break;
                    }
                    state.follow = true;
                }
                _ => {}
            },
            TermEvent::Mouse(me) => match me.kind {
                MouseEventKind::ScrollUp => scroll_up(&mut state),
                MouseEventKind::ScrollDown => state.scroll += 1,
                _ => {}
            },
            _ => {}
        }
    }
    Ok(())
}

fn scroll_up(state: &mut ViewState) {
    state.scroll = state.scroll.saturating_sub(1);
    state.follow = false;
}

/// Handle one submitted line. Returns true when the user asked to quit.
fn submit(node: &Node, feed: &Arc<Mutex<Vec<ChatLine>>>, input: &str) -> bool {
    // Run the command before taking the feed lock; a connect may block.
    let new_lines = if let Ok(Command::Say(text)) = commands::parse(input) {
        let (msg, _) = node.send_text(&text);
        vec![ChatLine { sender: "You".to_string(), text: msg.content().to_string(), time: format_time(&msg.timestamp()) }]
    } else {
        match commands::execute(node, input) {
            Reply::Quit => return true,
            Reply::Lines(lines) => lines.into_iter().map(ChatLine::system).collect(),
        }
    };
    feed.lock().unwrap_or_else(|e| e.into_inner()).extend(new_lines);
    false
}

fn draw(f: &mut Frame, state: &mut ViewState, node: &Node, peers: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(f.area());

    let lines: Vec<Line> = state
        .lines
        .iter()
        .map(|m| {
            let sender_color = if m.sender == "System" { Color::Rgb(255, 168, 64) } else { Color::Rgb(198, 120, 221) };
            Line::from(vec![
                Span::styled(format!("[{}] ", m.time), Style::default().fg(Color::Rgb(80, 250, 123))),
                Span::styled(m.sender.clone(), Style::default().fg(sender_color).add_modifier(Modifier::BOLD)),
                Span::raw(": "),
                Span::styled(m.text.clone(), Style::default().fg(TEXT)),
            ])
        })
        .collect();

    let viewport = chunks[0].height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(viewport);
    state.scroll = if state.follow { max_scroll } else { state.scroll.min(max_scroll) };
    if state.scroll == max_scroll {
        state.follow = true;
    }

    let title_style = Style::default().fg(ACCENT).add_modifier(Modifier::BOLD);
    let title = format!(" {} | {} | {} peers ", node.config().username, node.local_addr(), peers);
    let messages = Paragraph::new(lines.clone())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(title, title_style))
                .title_alignment(Alignment::Center)
                .border_style(title_style),
        )
        .style(Style::default().fg(TEXT).bg(BACKGROUND))
        .scroll((state.scroll as u16, 0));
    f.render_widget(messages, chunks[0]);

    let mut scrollbar_state = ScrollbarState::new(lines.len()).viewport_content_length(viewport).position(state.scroll);
    f.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight).begin_symbol(Some("↑")).end_symbol(Some("↓")),
        chunks[0],
        &mut scrollbar_state,
    );

    let input = Paragraph::new(format!("{}|", state.input))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(" Message or /command ", title_style))
                .border_style(title_style),
        )
        .style(Style::default().fg(TEXT).bg(BACKGROUND));
    f.render_widget(input, chunks[1]);
}
