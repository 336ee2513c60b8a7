use std::io::stdout;

use crate::anchor_store::AnchorItem;
use crate::gui::error::GhostGuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Lets the user tick any number of stored anchors. Returns the ticked ones,
/// or `None` if the user quit.
pub fn anchor_selector(
    mut anchors: Vec<AnchorItem>,
) -> Result<Option<Vec<AnchorItem>>, GhostGuiError> {
    if anchors.is_empty() {
        return Ok(Some(Vec::new()));
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_anchors = anchors.len();
    let mut confirmed = false;
    loop {
        let title = Title::from(" Resolve Anchors ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Toggle ".into(),
            "<Space>".magenta().bold(),
            " Resolve ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let rows = anchors.iter().map(|a| {
            let mark = if a.selected { "[x] " } else { "[ ] " };
            format!("{mark}{a}")
        });
        let list = List::new(rows)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(std::time::Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Down => {
                            cursor = (cursor + 1) % n_anchors;
                        }
                        KeyCode::Up => {
                            cursor = (cursor + n_anchors - 1) % n_anchors;
                        }
                        KeyCode::Char(' ') => {
                            anchors[cursor].selected = !anchors[cursor].selected;
                        }
                        KeyCode::Enter => {
                            confirmed = true;
                            break;
                        }
                        KeyCode::Char('q') => break,
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(confirmed.then(|| anchors.into_iter().filter(|a| a.selected).collect()))
}
