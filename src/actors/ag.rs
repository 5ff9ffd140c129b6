//! Search actor streaming `ag --vimgrep` results for query revisions
//!
//! The actor receives [`SearchMessage::UpdateQuery`] for every query revision
//! and keeps exactly one tool process running. Each revision supersedes the
//! previous session before its own process starts, and every outbound message
//! is tagged with the revision it belongs to.

use crate::actors::messages::{
    QueryRevision, SearchMessage, ABORT_SEARCH, CLEAR_RESULTS, COMPLETE_SEARCH, PUSH_CANDIDATES,
    SEARCH_FAILED, UPDATE_QUERY,
};
use crate::config::Config;
use crate::core::{
    Actor, ActorController, ActorSendError, CommandActor, CommandError, CommandHandler, Message,
    MessageHandler, StateView, StreamOptions,
};
use crate::search::{Candidate, CandidateFormatter, CommandBuilder, LineParser};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Turns tool output of one revision into candidate batches.
pub struct AgHandler {
    revision: u64,
    parser: LineParser,
    formatter: CandidateFormatter,
}

impl AgHandler {
    pub fn new(revision: u64, parser: LineParser, formatter: CandidateFormatter) -> Self {
        Self {
            revision,
            parser,
            formatter,
        }
    }
}

impl CommandHandler<SearchMessage> for AgHandler {
    type Item = Candidate;

    fn on_stdout(&mut self, line: String) -> Option<Candidate> {
        match self.parser.parse(&line) {
            Some(record) => Some(self.formatter.format(record)),
            None => {
                log::trace!("Skipping non-match line: {}", line);
                None
            }
        }
    }

    fn on_batch(&mut self, candidates: Vec<Candidate>) -> Message<SearchMessage> {
        Message::new(
            PUSH_CANDIDATES,
            SearchMessage::PushCandidates {
                revision: self.revision,
                candidates,
            },
        )
    }

    fn on_complete(&mut self, result: &Result<(), CommandError>) -> Option<Message<SearchMessage>> {
        let revision = self.revision;
        Some(match result {
            Ok(()) => Message::new(COMPLETE_SEARCH, SearchMessage::CompleteSearch { revision }),
            Err(e) => Message::new(
                SEARCH_FAILED,
                SearchMessage::SearchFailed {
                    revision,
                    message: e.to_string(),
                },
            ),
        })
    }
}

/// Message handler owning the command session.
pub struct SearchHandler {
    builder: CommandBuilder,
    cwd: PathBuf,
    max_columns: usize,
    command: CommandActor<SearchMessage>,
    tool_found: bool,
}

impl SearchHandler {
    pub fn new(
        builder: CommandBuilder,
        cwd: PathBuf,
        max_columns: usize,
        command: CommandActor<SearchMessage>,
    ) -> Self {
        Self {
            builder,
            cwd,
            max_columns,
            command,
            tool_found: false,
        }
    }

    async fn update_query(&mut self, query: QueryRevision, controller: &ActorController<SearchMessage>) {
        let revision = query.id;

        if !self.builder.is_searchable(&query.text) {
            log::debug!("Query {:?} too short, clearing results", query.text);
            self.command.reset().await;
            let _ = controller
                .send_message(CLEAR_RESULTS, SearchMessage::ClearResults { revision })
                .await;
            return;
        }

        if let Err(e) = self.check_tool() {
            self.fail(revision, e, controller).await;
            return;
        }

        let search = self.builder.build(&query.text);
        log::info!("Starting search #{}: {:?}", revision, search.argv);
        let handler = AgHandler::new(
            revision,
            LineParser::new(self.max_columns),
            CandidateFormatter::new(search.highlighter),
        );
        if let Err(e) = self.command.spawn(&search.argv, Some(&self.cwd), handler).await {
            self.fail(revision, e, controller).await;
        }
    }

    fn check_tool(&mut self) -> Result<(), CommandError> {
        if self.tool_found {
            return Ok(());
        }
        let tool = self.builder.tool();
        match which::which(tool) {
            Ok(path) => {
                log::debug!("Using {} at {}", tool, path.display());
                self.tool_found = true;
                Ok(())
            }
            Err(e) => {
                log::debug!("Tool lookup for {} failed: {}", tool, e);
                Err(CommandError::ToolNotFound(tool.to_string()))
            }
        }
    }

    async fn fail(&mut self, revision: u64, error: CommandError, controller: &ActorController<SearchMessage>) {
        log::error!("Search #{} failed: {}", revision, error);
        self.command.fail().await;
        let _ = controller
            .send_message(
                SEARCH_FAILED,
                SearchMessage::SearchFailed {
                    revision,
                    message: error.to_string(),
                },
            )
            .await;
    }
}

#[async_trait]
impl MessageHandler<SearchMessage> for SearchHandler {
    async fn on_message(&mut self, message: Message<SearchMessage>, controller: &ActorController<SearchMessage>) {
        match (message.method.as_str(), message.payload) {
            (UPDATE_QUERY, SearchMessage::UpdateQuery(query)) => {
                self.update_query(query, controller).await;
            }
            (ABORT_SEARCH, _) => {
                if self.command.kill().await {
                    log::info!("Search aborted");
                }
            }
            (method, _) => {
                log::debug!("Unknown message method: {}", method);
            }
        }
    }

    async fn on_shutdown(&mut self, _controller: &ActorController<SearchMessage>) {
        self.command.kill().await;
    }
}

/// Handle used by the picker side to drive searches.
pub struct SearchActor {
    actor: Actor<SearchMessage>,
    state: StateView,
    next_revision: u64,
    last_revision: Option<QueryRevision>,
}

impl SearchActor {
    /// Start a search actor running the tool in `cwd`.
    ///
    /// Returns the actor and the receiving end of its outbound messages.
    pub fn new(
        builder: CommandBuilder,
        cwd: PathBuf,
        config: &Config,
    ) -> (Self, mpsc::Receiver<Message<SearchMessage>>) {
        Self::with_options(
            builder,
            cwd,
            config.max_columns,
            config.stream_options(),
            config.channel_capacity,
        )
    }

    pub fn with_options(
        builder: CommandBuilder,
        cwd: PathBuf,
        max_columns: usize,
        options: StreamOptions,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Message<SearchMessage>>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
        let controller = ActorController::new(out_tx);

        let command = CommandActor::new(controller.clone(), options);
        let state = command.state_view();
        let handler = SearchHandler::new(builder, cwd, max_columns, command);
        let actor = Actor::new(inbox_rx, inbox_tx, controller, handler);

        (
            Self {
                actor,
                state,
                next_revision: 0,
                last_revision: None,
            },
            out_rx,
        )
    }

    /// Issue a new query revision, returning its id.
    pub fn revise(&mut self, text: impl Into<Arc<str>>) -> Result<u64, ActorSendError> {
        self.next_revision += 1;
        let revision = QueryRevision {
            id: self.next_revision,
            text: text.into(),
        };
        self.actor
            .send_message(UPDATE_QUERY, SearchMessage::UpdateQuery(revision.clone()))?;
        self.last_revision = Some(revision);
        Ok(self.next_revision)
    }

    /// Most recently issued revision.
    pub fn last_revision(&self) -> Option<&QueryRevision> {
        self.last_revision.as_ref()
    }

    /// Kill the running search without issuing a new one.
    pub fn abort(&self) -> Result<(), ActorSendError> {
        self.actor.send_message(ABORT_SEARCH, SearchMessage::AbortSearch)
    }

    pub fn state(&self) -> &StateView {
        &self.state
    }

    /// Stop the actor, killing any running process.
    pub async fn shutdown(&mut self) {
        self.actor.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionState;
    use std::time::Duration;
    use tokio::time::timeout;

    fn fake_tool(script: &str) -> Config {
        Config {
            tool: "sh".to_string(),
            tool_args: vec!["-c".to_string(), script.to_string(), "fake".to_string()],
            line_buffered: false,
            min_input: 1,
            flush_ms: 5,
            ..Config::default()
        }
    }

    fn start(config: &Config) -> (SearchActor, mpsc::Receiver<Message<SearchMessage>>) {
        let builder = CommandBuilder::from_config(config, vec![PathBuf::from(".")]);
        SearchActor::new(builder, std::env::temp_dir(), config)
    }

    /// Receive messages until one ends `revision`.
    async fn until_done(rx: &mut mpsc::Receiver<Message<SearchMessage>>, revision: u64) -> Vec<SearchMessage> {
        let mut messages = Vec::new();
        loop {
            let message = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for search")
                .expect("channel closed");
            let done = message.payload.revision() == Some(revision)
                && matches!(
                    message.payload,
                    SearchMessage::CompleteSearch { .. }
                        | SearchMessage::SearchFailed { .. }
                        | SearchMessage::ClearResults { .. }
                );
            messages.push(message.payload);
            if done {
                return messages;
            }
        }
    }

    fn candidates(messages: &[SearchMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                SearchMessage::PushCandidates { candidates, .. } => Some(candidates),
                _ => None,
            })
            .flatten()
            .map(|c| c.display().to_string())
            .collect()
    }

    #[test]
    fn test_handler_formats_and_tags_batches() {
        let mut handler = AgHandler::new(7, LineParser::new(300), CandidateFormatter::default());
        let candidate = handler.on_stdout("a.txt:3:5:hello world".to_string()).unwrap();
        assert!(handler.on_stdout("ag: error opening file".to_string()).is_none());

        let message = handler.on_batch(vec![candidate]);
        assert_eq!(message.method, PUSH_CANDIDATES);
        match message.payload {
            SearchMessage::PushCandidates { revision, candidates } => {
                assert_eq!(revision, 7);
                assert_eq!(candidates[0].display(), "a.txt:3:5:hello world");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_handler_reports_failure() {
        let mut handler = AgHandler::new(2, LineParser::new(300), CandidateFormatter::default());
        let message = handler
            .on_complete(&Err(CommandError::ToolNotFound("ag".to_string())))
            .unwrap();
        assert_eq!(message.method, SEARCH_FAILED);
        assert!(matches!(
            message.payload,
            SearchMessage::SearchFailed { revision: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_streams_candidates_for_revision() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = fake_tool("printf 'a.txt:3:5:hello world\\nnoise\\nb.txt:1:1:%s\\n' \"$1\"");
        let (mut actor, mut rx) = start(&config);

        let revision = actor.revise("needle").unwrap();
        let messages = until_done(&mut rx, revision).await;

        assert_eq!(
            candidates(&messages),
            vec!["a.txt:3:5:hello world", "b.txt:1:1:needle"]
        );
        assert!(matches!(messages.last(), Some(SearchMessage::CompleteSearch { .. })));
        assert_eq!(actor.state().get(), SessionState::Completed);
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_short_query_clears_results() {
        let config = Config {
            min_input: 3,
            ..fake_tool("echo a:1:1:x")
        };
        let (mut actor, mut rx) = start(&config);

        let revision = actor.revise("ab").unwrap();
        let messages = until_done(&mut rx, revision).await;
        assert!(matches!(messages.as_slice(), [SearchMessage::ClearResults { .. }]));
        assert_eq!(actor.state().get(), SessionState::Idle);
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_tool_fails_once() {
        let config = Config {
            tool: "agpick-no-such-tool".to_string(),
            ..fake_tool("")
        };
        let (mut actor, mut rx) = start(&config);

        let revision = actor.revise("needle").unwrap();
        let messages = until_done(&mut rx, revision).await;
        match messages.as_slice() {
            [SearchMessage::SearchFailed { message, .. }] => {
                assert!(message.contains("agpick-no-such-tool"));
            }
            other => panic!("unexpected messages {:?}", other),
        }
        assert_eq!(actor.state().get(), SessionState::Failed);
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_kills_running_search() {
        let config = fake_tool("echo a:1:1:x; sleep 30");
        let (mut actor, mut rx) = start(&config);

        actor.revise("x").unwrap();
        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.method, PUSH_CANDIDATES);

        actor.abort().unwrap();
        // Superseded sessions send nothing more.
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        assert_eq!(actor.state().get(), SessionState::Superseded);
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_superseded_revision_stops_delivering() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("slow.pid");
        // The slow search records its pid and keeps it through exec.
        let config = fake_tool(&format!(
            "case \"$*\" in *slow*) echo $$ > '{}'; echo a.txt:1:1:slow; exec sleep 30;; *) echo b.txt:2:1:fast;; esac",
            pid_file.display()
        ));
        let (mut actor, mut rx) = start(&config);

        let slow = actor.revise("slow").unwrap();
        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.payload.revision(), Some(slow));

        let fast = actor.revise("fast").unwrap();
        let messages = until_done(&mut rx, fast).await;
        let revisions: Vec<_> = messages.iter().map(|m| m.revision()).collect();
        let first_fast = revisions
            .iter()
            .position(|r| *r == Some(fast))
            .expect("no message for the new revision");
        assert!(
            revisions[first_fast..].iter().all(|r| *r == Some(fast)),
            "stale delivery after the new revision began: {:?}",
            revisions
        );
        assert_eq!(candidates(&messages[first_fast..]), vec!["b.txt:2:1:fast"]);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .status()
            .unwrap();
        assert!(!alive.success(), "superseded process {} still running", pid.trim());

        // Nothing more arrives for either revision.
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
        assert_eq!(actor.state().get(), SessionState::Completed);
        actor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_full_channel() {
        let config = Config {
            min_input: 3,
            ..fake_tool("echo a:1:1:x")
        };
        let builder = CommandBuilder::from_config(&config, vec![PathBuf::from(".")]);
        let (mut actor, _rx) = SearchActor::with_options(
            builder,
            std::env::temp_dir(),
            config.max_columns,
            config.stream_options(),
            1,
        );

        // Nobody reads: the first clear fills the channel and the second blocks.
        actor.revise("a").unwrap();
        actor.revise("b").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(1), actor.shutdown())
            .await
            .expect("shutdown hung on a full channel");
    }
}
