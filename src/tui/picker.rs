//! Terminal picker
//!
//! Runs the interactive loop: keyboard input, candidate batches from the
//! search actor, debounce deadlines and toast expiry are multiplexed with one
//! `tokio::select!`. The chosen file is opened while the picker is still on
//! screen, so a failure shows up as a toast. The terminal is restored before
//! the commit or cancel action runs, so an editor launched by the jump gets a
//! clean screen.

use super::input::{InputOperation, QueryInput};
use super::list::{ListEvent, ResultList};
use super::renderer::{render, View};
use super::search_debouncer::SearchDebouncer;
use super::toast::{ToastState, ToastType, TOAST_DURATION};
use crate::picker::{
    CandidateSource, History, Picker, PickerAction, PickerOutcome, PickerRequest, PickerState,
    Preview, StateReply,
};
use crate::search::{split_query, Candidate, Location};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::Stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// How long one crossterm poll may block the input thread.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// Redraw interval while nothing else happens, for toast expiry.
const UI_TICK: Duration = Duration::from_millis(250);

/// What a key press asks the picker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    Edit(InputOperation),
    SelectPrevious,
    SelectNext,
    ToggleGroup,
    HistoryPrevious,
    HistoryNext,
    Commit,
    Cancel,
}

/// Map a key event to a picker command.
pub fn map_key(key: KeyEvent) -> Option<KeyCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    let command = match (key.code, ctrl, alt) {
        (KeyCode::Esc, _, _) | (KeyCode::Char('c'), true, _) | (KeyCode::Char('g'), true, _) => {
            KeyCommand::Cancel
        }
        (KeyCode::Enter, _, _) => KeyCommand::Commit,
        (KeyCode::Up, _, _) | (KeyCode::Char('p'), true, _) => KeyCommand::SelectPrevious,
        (KeyCode::Down, _, _) | (KeyCode::Char('n'), true, _) => KeyCommand::SelectNext,
        (KeyCode::Tab, _, _) => KeyCommand::ToggleGroup,
        (KeyCode::Char('p'), false, true) => KeyCommand::HistoryPrevious,
        (KeyCode::Char('n'), false, true) => KeyCommand::HistoryNext,
        (KeyCode::Home, _, _) | (KeyCode::Char('a'), true, _) => {
            KeyCommand::Edit(InputOperation::MoveCursorToStart)
        }
        (KeyCode::End, _, _) | (KeyCode::Char('e'), true, _) => {
            KeyCommand::Edit(InputOperation::MoveCursorToEnd)
        }
        (KeyCode::Left, _, _) | (KeyCode::Char('b'), true, _) => {
            KeyCommand::Edit(InputOperation::MoveCursorLeft)
        }
        (KeyCode::Right, _, _) | (KeyCode::Char('f'), true, _) => {
            KeyCommand::Edit(InputOperation::MoveCursorRight)
        }
        (KeyCode::Backspace, _, _) | (KeyCode::Char('h'), true, _) => {
            KeyCommand::Edit(InputOperation::DeleteCharBackward)
        }
        (KeyCode::Delete, _, _) | (KeyCode::Char('d'), true, _) => {
            KeyCommand::Edit(InputOperation::DeleteCharForward)
        }
        (KeyCode::Char('w'), true, _) => KeyCommand::Edit(InputOperation::DeleteWordBackward),
        (KeyCode::Char('u'), true, _) => KeyCommand::Edit(InputOperation::ClearLine),
        (KeyCode::Char('k'), true, _) => KeyCommand::Edit(InputOperation::KillLine),
        (KeyCode::Char('y'), true, _) => KeyCommand::Edit(InputOperation::Yank),
        (KeyCode::Char(c), false, false) => KeyCommand::Edit(InputOperation::InsertChar(c)),
        _ => return None,
    };
    Some(command)
}

/// Raw mode plus alternate screen, undone on [`TerminalSession::leave`] or drop.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl TerminalSession {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = std::io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("Failed to enter alternate screen");
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self {
            terminal,
            active: true,
        })
    }

    fn leave(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            log::warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Crossterm events read on a blocking thread.
struct InputReader {
    events: UnboundedReceiverStream<Event>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl InputReader {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::task::spawn_blocking(move || {
            while !cancelled.is_cancelled() {
                match crossterm::event::poll(INPUT_POLL) {
                    Ok(true) => match crossterm::event::read() {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            log::error!("Failed to read terminal event: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("Failed to poll terminal events: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            events: UnboundedReceiverStream::new(rx),
            token,
            task,
        }
    }

    /// Stop reading so no key meant for the next program is consumed.
    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            log::warn!("Input reader ended abnormally: {}", e);
        }
    }
}

enum Exit {
    Commit(Candidate),
    Cancel,
}

/// Mutable state of one picker run.
struct Session<'r> {
    prompt: String,
    source: &'r mut CandidateSource,
    state: &'r mut dyn PickerState,
    lookup: fn(&Candidate) -> &Location,
    require_match: bool,
    history_key: &'static str,
    history: &'r History,
    input: QueryInput,
    list: ResultList,
    debouncer: SearchDebouncer,
    toast: ToastState,
    preview: Option<Preview>,
    previewed: Option<Location>,
    show_preview: bool,
    history_index: Option<usize>,
    draft: String,
    /// Query text of the last issued revision
    searched: String,
}

impl<'r> Session<'r> {
    fn new(request: PickerRequest<'r>, debounce: Duration, show_preview: bool) -> Self {
        let PickerRequest {
            prompt,
            source,
            lookup,
            state,
            group,
            grouped,
            require_match,
            initial,
            history_key,
            history,
        } = request;

        let mut list = ResultList::new(group, grouped);
        list.set_filter(split_query(&initial).filter);
        Self {
            prompt,
            source,
            state,
            lookup,
            require_match,
            history_key,
            history,
            input: QueryInput::new(initial),
            list,
            debouncer: SearchDebouncer::with_delay(debounce),
            toast: ToastState::new(),
            preview: None,
            previewed: None,
            show_preview,
            history_index: None,
            draft: String::new(),
            searched: String::new(),
        }
    }

    fn revise(&mut self, query: &str) -> Result<()> {
        let revision = self
            .source
            .revise(query)
            .map_err(|e| anyhow!("Search actor stopped: {}", e))?;
        log::debug!("Issued revision #{} for {:?}", revision, query);
        self.searched = query.to_string();
        self.list.begin_revision();
        Ok(())
    }

    /// Search for `query` unless it differs from the last search only in its
    /// local filter.
    fn revise_if_changed(&mut self, query: &str) -> Result<()> {
        if split_query(query).same_search(&split_query(&self.searched)) {
            log::trace!("Only the local filter changed: {:?}", query);
            return Ok(());
        }
        self.revise(query)
    }

    /// Apply the input's local filter now and queue its search.
    fn queue_input(&mut self) {
        let text = self.input.text().to_string();
        self.list.set_filter(split_query(&text).filter);
        self.debouncer.set_pending(text);
    }

    fn edited(&mut self) {
        self.history_index = None;
        self.queue_input();
    }

    fn on_message(&mut self, message: crate::actors::SearchMessage) {
        if let ListEvent::Failed(notice) = self.list.apply(message) {
            self.toast.show(notice, ToastType::Error, TOAST_DURATION);
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Option<Exit> {
        let command = map_key(key)?;
        match command {
            KeyCommand::Edit(operation) => {
                if self.input.apply(operation) {
                    self.edited();
                }
            }
            KeyCommand::SelectPrevious => self.list.select_previous(),
            KeyCommand::SelectNext => self.list.select_next(),
            KeyCommand::ToggleGroup => self.list.toggle_grouped(),
            KeyCommand::HistoryPrevious => {
                let back = self.history_index.map_or(0, |i| i + 1);
                if let Some(query) = self.history.recall(self.history_key, back) {
                    if self.history_index.is_none() {
                        self.draft = self.input.text().to_string();
                    }
                    self.history_index = Some(back);
                    self.input.set_text(query);
                    self.queue_input();
                }
            }
            KeyCommand::HistoryNext => match self.history_index {
                None => {}
                Some(0) => {
                    self.history_index = None;
                    let draft = std::mem::take(&mut self.draft);
                    self.input.set_text(draft);
                    self.queue_input();
                }
                Some(i) => {
                    if let Some(query) = self.history.recall(self.history_key, i - 1) {
                        self.history_index = Some(i - 1);
                        self.input.set_text(query);
                        self.queue_input();
                    }
                }
            },
            KeyCommand::Commit => match self.list.selected().cloned() {
                Some(candidate) => match self.state.on_action(PickerAction::Open(&candidate)) {
                    Ok(_) => return Some(Exit::Commit(candidate)),
                    Err(e) => {
                        log::warn!("Cannot open {}: {}", candidate.display(), e);
                        self.toast.show(e.to_string(), ToastType::Error, TOAST_DURATION);
                    }
                },
                None if self.require_match => {
                    self.toast.show("No match selected", ToastType::Info, TOAST_DURATION);
                }
                None => {}
            },
            KeyCommand::Cancel => return Some(Exit::Cancel),
        }
        None
    }

    fn refresh_preview(&mut self) {
        if !self.show_preview {
            return;
        }
        let Some(candidate) = self.list.selected() else {
            self.preview = None;
            self.previewed = None;
            return;
        };
        let location = (self.lookup)(candidate);
        if self.previewed.as_ref() == Some(location) {
            return;
        }
        self.previewed = Some(location.clone());

        match self.state.on_action(PickerAction::Preview(candidate)) {
            Ok(StateReply::Preview(preview)) => self.preview = Some(preview),
            Ok(_) => self.preview = None,
            Err(e) => {
                log::warn!("Preview failed: {}", e);
                self.preview = None;
                self.toast.show(e.to_string(), ToastType::Warning, TOAST_DURATION);
            }
        }
    }

    async fn run(&mut self, terminal: &mut TerminalSession, input: &mut InputReader) -> Result<Exit> {
        let mut tick = tokio::time::interval(UI_TICK);
        let mut source_open = true;

        loop {
            self.refresh_preview();
            terminal.terminal.draw(|f| {
                let view = View {
                    prompt: &self.prompt,
                    input: &self.input,
                    list: &self.list,
                    preview: self.preview.as_ref(),
                    toast: &self.toast,
                };
                render(f, &view);
            })?;

            let deadline = self.debouncer.deadline();
            tokio::select! {
                event = input.events.next() => match event {
                    Some(Event::Key(key)) => {
                        if let Some(exit) = self.on_key(key) {
                            return Ok(exit);
                        }
                    }
                    Some(_) => {}
                    None => {
                        log::warn!("Terminal input closed");
                        return Ok(Exit::Cancel);
                    }
                },
                message = self.source.next(), if source_open => match message {
                    Some(message) => self.on_message(message),
                    None => {
                        log::warn!("Search actor stopped sending");
                        source_open = false;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(query) = self.debouncer.take_ready() {
                        self.revise_if_changed(&query)?;
                    }
                }
                _ = tick.tick() => self.toast.update(),
            }
        }
    }
}

/// [`Picker`] drawing on the terminal with ratatui.
pub struct TuiPicker {
    debounce: Duration,
    show_preview: bool,
}

impl TuiPicker {
    pub fn new(debounce: Duration, show_preview: bool) -> Self {
        Self {
            debounce,
            show_preview,
        }
    }
}

#[async_trait]
impl Picker for TuiPicker {
    async fn pick(&mut self, request: PickerRequest<'_>) -> Result<PickerOutcome> {
        let mut session = Session::new(request, self.debounce, self.show_preview);
        let initial = session.input.text().to_string();
        session.revise(&initial)?;

        let mut terminal = TerminalSession::enter()?;
        let mut input = InputReader::spawn();
        let exit = session.run(&mut terminal, &mut input).await;
        input.stop().await;
        terminal.leave()?;

        let query = session.input.text().to_string();
        match exit? {
            Exit::Commit(candidate) => {
                let reply = session
                    .state
                    .on_action(PickerAction::Commit(&candidate))
                    .with_context(|| format!("Cannot jump to {}", candidate.display()))?;
                match reply {
                    StateReply::Jumped(position) => Ok(PickerOutcome::Jumped { query, position }),
                    _ => Err(anyhow!("Selection {} did not resolve", candidate.display())),
                }
            }
            Exit::Cancel => {
                session.state.on_action(PickerAction::Cancel)?;
                Ok(PickerOutcome::Cancelled { query })
            }
        }
    }
}
