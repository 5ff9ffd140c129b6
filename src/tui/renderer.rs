//! TUI rendering
//!
//! Layout: query line on top, results (with an optional preview pane on the
//! right) in the middle, status bar at the bottom, toast over everything.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::input::QueryInput;
use super::list::{ResultList, Row, SearchStatus};
use super::toast::{ToastState, ToastType};
use crate::picker::Preview;
use crate::search::{Style as CandidateStyle, StyledSpan};

/// Everything one frame shows.
pub struct View<'a> {
    pub prompt: &'a str,
    pub input: &'a QueryInput,
    pub list: &'a ResultList,
    pub preview: Option<&'a Preview>,
    pub toast: &'a ToastState,
}

pub fn render(f: &mut Frame, view: &View<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Query line
            Constraint::Min(1),    // Results and preview
            Constraint::Length(1), // Status bar
        ])
        .split(f.size());

    render_input(f, chunks[0], view.prompt, view.input);

    match view.preview {
        Some(preview) => {
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(chunks[1]);
            render_results(f, panes[0], view.list);
            render_preview(f, panes[1], preview);
        }
        None => render_results(f, chunks[1], view.list),
    }

    render_status(f, chunks[2], view.list);

    if let Some(toast) = view.toast.visible() {
        render_toast(f, &toast.message, toast.toast_type);
    }
}

fn render_input(f: &mut Frame, area: Rect, prompt: &str, input: &QueryInput) {
    let line = Line::from(vec![
        Span::styled(prompt, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(input.text()),
    ]);
    f.render_widget(Paragraph::new(line), area);

    let cursor_x = area.x + (prompt.chars().count() + input.cursor()) as u16;
    f.set_cursor(cursor_x.min(area.right().saturating_sub(1)), area.y);
}

fn span_style(style: CandidateStyle) -> Style {
    match style {
        CandidateStyle::Path => Style::default().fg(Color::Magenta),
        CandidateStyle::Location => Style::default().fg(Color::Green),
        CandidateStyle::Match => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Split `text` into spans styled by `spans` (sorted, non-overlapping).
fn styled_line(text: &str, spans: impl IntoIterator<Item = StyledSpan>) -> Line<'_> {
    let mut parts = Vec::new();
    let mut at = 0;
    for span in spans {
        let (start, end) = (span.range.start.max(at), span.range.end.min(text.len()));
        if start >= end {
            continue;
        }
        if start > at {
            parts.push(Span::raw(&text[at..start]));
        }
        parts.push(Span::styled(&text[start..end], span_style(span.style)));
        at = end;
    }
    if at < text.len() {
        parts.push(Span::raw(&text[at..]));
    }
    Line::from(parts)
}

fn render_results(f: &mut Frame, area: Rect, list: &ResultList) {
    let candidates = list.candidates();
    let selected = list.selected_index();
    let mut selected_row = None;

    let items: Vec<ListItem> = list
        .rows()
        .into_iter()
        .enumerate()
        .map(|(row, item)| match item {
            Row::Header(path) => ListItem::new(Line::from(Span::styled(
                path,
                span_style(CandidateStyle::Path).add_modifier(Modifier::BOLD),
            ))),
            Row::Item(index) => {
                if Some(index) == selected {
                    selected_row = Some(row);
                }
                let candidate = &candidates[index];
                let line = if list.grouped() {
                    styled_line(candidate.ungrouped(), candidate.ungrouped_spans())
                } else {
                    styled_line(candidate.display(), candidate.spans().iter().cloned())
                };
                ListItem::new(line)
            }
        })
        .collect();

    let results = List::new(items)
        .block(Block::default().borders(Borders::TOP))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    state.select(selected_row);
    f.render_stateful_widget(results, area, &mut state);
}

fn render_preview(f: &mut Frame, area: Rect, preview: &Preview) {
    let width = preview
        .lines
        .last()
        .map_or(1, |(number, _)| number.to_string().len());
    let lines: Vec<Line> = preview
        .lines
        .iter()
        .map(|(number, text)| {
            let gutter = Span::styled(
                format!("{:>width$} ", number, width = width),
                Style::default().fg(Color::DarkGray),
            );
            let style = if *number == preview.line {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![gutter, Span::styled(text.as_str(), style)])
        })
        .collect();

    let title = preview.path.display().to_string();
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::TOP | Borders::LEFT)
            .title(title),
    );
    f.render_widget(paragraph, area);
}

fn render_status(f: &mut Frame, area: Rect, list: &ResultList) {
    let state = match list.status() {
        SearchStatus::Idle => "idle".to_string(),
        SearchStatus::Searching => "searching...".to_string(),
        SearchStatus::Done => "done".to_string(),
        SearchStatus::Failed(_) => "failed".to_string(),
    };
    let position = list
        .selected_position()
        .map_or_else(|| format!("0/{}", list.len()), |i| format!("{}/{}", i + 1, list.len()));
    let text = format!(
        " {} [{}]  Enter: jump  Tab: group  Alt-p/Alt-n: history  Esc: quit",
        position, state
    );
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::Black).bg(Color::Gray)),
        area,
    );
}

fn render_toast(f: &mut Frame, message: &str, toast_type: ToastType) {
    let area = f.size();
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let rect = Rect {
        x: area.width.saturating_sub(width),
        y: area.y + 1,
        width,
        height: 3.min(area.height.saturating_sub(1)),
    };

    let color = match toast_type {
        ToastType::Info => Color::Blue,
        ToastType::Warning => Color::Yellow,
        ToastType::Error => Color::Red,
    };
    let toast = Paragraph::new(message)
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)));
    f.render_widget(Clear, rect);
    f.render_widget(toast, rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{group_key, CandidateFormatter, LineParser};
    use crate::tui::toast::TOAST_DURATION;
    use ratatui::{backend::TestBackend, Terminal};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(&buffer.get(x, y).symbol);
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_styled_line_splits_text() {
        let spans = vec![
            StyledSpan {
                range: 0..1,
                style: CandidateStyle::Path,
            },
            StyledSpan {
                range: 2..5,
                style: CandidateStyle::Location,
            },
        ];
        let line = styled_line("a:1:1:x", spans);
        let parts: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(parts, vec!["a", ":", "1:1", ":x"]);
    }

    #[test]
    fn test_render_shows_prompt_and_candidates() {
        let mut list = ResultList::new(group_key, true);
        list.begin_revision();
        let mut parser = LineParser::new(300);
        let formatter = CandidateFormatter::default();
        list.apply(crate::actors::SearchMessage::PushCandidates {
            revision: 1,
            candidates: vec![formatter.format(parser.parse("src/a.rs:3:5:hello").unwrap())],
        });

        let input = QueryInput::new("hello");
        let mut toast = ToastState::new();
        toast.show("ag: command not found", ToastType::Error, TOAST_DURATION);
        let view = View {
            prompt: "Ag (in demo): ",
            input: &input,
            list: &list,
            preview: None,
            toast: &toast,
        };

        let mut terminal = Terminal::new(TestBackend::new(60, 10)).unwrap();
        terminal.draw(|f| render(f, &view)).unwrap();
        let text = buffer_text(&terminal);

        assert!(text.contains("Ag (in demo): hello"));
        assert!(text.contains("src/a.rs"));
        assert!(text.contains("3:5:hello"));
        assert!(text.contains("ag: command not found"));
    }
}
