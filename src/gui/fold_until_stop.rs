use std::{
    fmt::Display,
    io::stdout,
    ops::ControlFlow,
    sync::mpsc::{self, Receiver},
    thread::spawn,
};

use crate::gui::error::GhostGuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

/// How many status lines stay on screen.
const HISTORY: usize = 12;

enum ThreadMessage {
    Stop,
}

/// Runs a step function on a worker thread while showing the status messages
/// it produces, until it finishes or the user presses a key.
///
/// The function can be thought of as a recursive fold. `init` contains the
/// inital state of the loop, then `f` is called on the inital state to produce
/// a new state, and so on until `f` breaks or the user stops it. Whatever
/// arrives on `status` is listed, newest last.
pub fn fold_until_stop<F, T, M>(
    title: &str,
    init: T,
    f: F,
    status: Receiver<M>,
) -> Result<T, GhostGuiError>
where
    F: Fn(T) -> ControlFlow<T, T> + Send + 'static,
    T: Send + 'static,
    M: Display,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (stop_tx, stop_rx) = mpsc::channel();

    let th = spawn(move || {
        let mut val = init;
        loop {
            val = match f(val) {
                ControlFlow::Continue(v) => v,
                ControlFlow::Break(v) => break v,
            };
            if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
                break val;
            }
        }
    });

    let mut lines: Vec<String> = Vec::new();
    loop {
        lines.extend(status.try_iter().map(|m| m.to_string()));
        if lines.len() > HISTORY {
            lines.drain(..lines.len() - HISTORY);
        }
        let footer = if th.is_finished() {
            " Finished, press any key to exit "
        } else {
            " Press any key to stop "
        };

        let heading = Title::from(Span::styled(
            format!(" {title} "),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ));
        let mut text: Vec<Line> = lines.iter().map(|l| Line::from(l.as_str())).collect();
        text.push(Line::from(""));
        text.push(Line::from(footer.magenta()));
        let block = Block::default()
            .title(heading.alignment(Alignment::Center))
            .borders(Borders::ALL);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(Paragraph::new(text).block(block), area);
        })?;
        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    break;
                }
            }
        }
    }

    // The worker may already be done and gone.
    let _ = stop_tx.send(ThreadMessage::Stop);
    let res = th.join().map_err(|_| GhostGuiError::JoinError);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    res
}
