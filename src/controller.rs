//! Top-level session wiring
//!
//! [`SessionController::run`] picks the search root, starts the search actor,
//! hands everything to a [`Picker`] and tears the session down afterwards.

use crate::actors::SearchActor;
use crate::config::Config;
use crate::picker::{
    CandidateSource, History, Picker, PickerAction, PickerOutcome, PickerRequest, PickerState,
    Preview, StateReply,
};
use crate::resolve::{resolve, FileOpener, Jump, ResolveError};
use crate::search::{group_key, Candidate, CommandBuilder};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// History key of search queries.
pub const HISTORY_KEY: &str = "agpick";

/// Lines shown on each side of a previewed match.
const PREVIEW_CONTEXT: usize = 5;

/// Where a session searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    /// Working directory of the tool; candidate paths are relative to it
    pub dir: PathBuf,
    /// Path arguments of the tool
    pub paths: Vec<PathBuf>,
    label: String,
}

impl SearchRoot {
    /// Search root for an optional `target`, relative to `cwd`.
    ///
    /// Without a target the nearest ancestor of `cwd` holding `.git` is used,
    /// or `cwd` itself outside a repository.
    pub fn resolve(target: Option<&Path>, cwd: &Path) -> Result<Self> {
        let Some(target) = target else {
            let dir = find_repository_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
            return Ok(Self::directory(dir));
        };

        let target = cwd.join(target);
        let metadata = std::fs::metadata(&target)
            .with_context(|| format!("Cannot search {}", target.display()))?;
        if metadata.is_dir() {
            return Ok(Self::directory(target));
        }

        let (Some(dir), Some(name)) = (target.parent(), target.file_name()) else {
            bail!("Cannot search {}", target.display());
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            paths: vec![PathBuf::from(name)],
            label: format!("Ag (file {}): ", name.to_string_lossy()),
        })
    }

    fn directory(dir: PathBuf) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self {
            label: format!("Ag (in {}): ", name),
            paths: vec![PathBuf::from(".")],
            dir,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.label
    }
}

fn find_repository_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// [`PickerState`] resolving actions against files under `root`.
pub struct JumpState<'a, O: FileOpener + Send> {
    opener: &'a mut O,
    jump: &'a mut (dyn Jump + Send),
    root: PathBuf,
}

impl<'a, O: FileOpener + Send> JumpState<'a, O> {
    pub fn new(opener: &'a mut O, jump: &'a mut (dyn Jump + Send), root: PathBuf) -> Self {
        Self { opener, jump, root }
    }

    fn preview(&mut self, candidate: &Candidate) -> Result<StateReply, ResolveError> {
        let location = candidate.location();
        let path = self.root.join(&*location.path);
        let buffer = self.opener.open(&path)?;
        let text = self.opener.contents(buffer).unwrap_or_default();
        Ok(StateReply::Preview(Preview::from_text(
            path,
            text,
            location.line,
            PREVIEW_CONTEXT,
        )))
    }
}

impl<O: FileOpener + Send> PickerState for JumpState<'_, O> {
    fn on_action(&mut self, action: PickerAction<'_>) -> Result<StateReply, ResolveError> {
        match action {
            PickerAction::Preview(candidate) => self.preview(candidate),
            PickerAction::Open(candidate) => {
                let path = self.root.join(&*candidate.location().path);
                self.opener.open(&path)?;
                Ok(StateReply::None)
            }
            PickerAction::Commit(candidate) => {
                let position = resolve(
                    Some(candidate),
                    &self.root,
                    &mut *self.opener,
                    &mut *self.jump,
                )?;
                Ok(position.map_or(StateReply::None, StateReply::Jumped))
            }
            PickerAction::Cancel => {
                resolve(None, &self.root, &mut *self.opener, &mut *self.jump)?;
                Ok(StateReply::None)
            }
        }
    }
}

/// Runs interactive search sessions.
pub struct SessionController {
    config: Config,
    history: History,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            history: History::new(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run one session.
    ///
    /// `target` is the optional search root, `initial` seeds the query. On a
    /// cancel the opener is released by the resolver; after a jump or a
    /// failed pick the controller releases whatever was opened only for
    /// previews.
    pub async fn run<P, O>(
        &mut self,
        picker: &mut P,
        opener: &mut O,
        jump: &mut (dyn Jump + Send),
        target: Option<&Path>,
        cwd: &Path,
        initial: Option<String>,
    ) -> Result<PickerOutcome>
    where
        P: Picker + ?Sized,
        O: FileOpener + Send,
    {
        let root = SearchRoot::resolve(target, cwd)?;
        log::info!("Searching in {}", root.dir.display());

        let builder = CommandBuilder::from_config(&self.config, root.paths.clone());
        let (actor, receiver) = SearchActor::new(builder, root.dir.clone(), &self.config);
        let mut source = CandidateSource::new(actor, receiver);

        let outcome = {
            let mut state = JumpState::new(opener, jump, root.dir.clone());
            let request = PickerRequest {
                prompt: root.prompt().to_string(),
                source: &mut source,
                lookup: Candidate::location,
                state: &mut state,
                group: group_key,
                grouped: self.config.group,
                require_match: true,
                initial: initial.unwrap_or_default(),
                history_key: HISTORY_KEY,
                history: &mut self.history,
            };
            picker.pick(request).await
        };
        source.close().await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // A failed pick never reaches the resolver's release.
                opener.release();
                return Err(e);
            }
        };
        if let PickerOutcome::Jumped { query, position } = &outcome {
            log::info!("Jumped to {}:{}", position.path.display(), position.line);
            self.history.record(HISTORY_KEY, query);
            opener.release();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{Position, TemporaryFileRegistry};
    use crate::search::{CandidateFormatter, LineParser};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingJump {
        positions: Vec<Position>,
    }

    impl Jump for RecordingJump {
        fn jump(&mut self, position: &Position) -> std::io::Result<()> {
            self.positions.push(position.clone());
            Ok(())
        }
    }

    fn candidate(line: &str) -> Candidate {
        CandidateFormatter::default().format(LineParser::new(300).parse(line).unwrap())
    }

    #[test]
    fn test_root_defaults_to_repository() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let root = SearchRoot::resolve(None, &nested).unwrap();
        assert_eq!(root.dir, dir.path());
        assert_eq!(root.paths, vec![PathBuf::from(".")]);
        let name = dir.path().file_name().unwrap().to_string_lossy();
        assert_eq!(root.prompt(), format!("Ag (in {}): ", name));
    }

    #[test]
    fn test_root_outside_repository_is_cwd() {
        let dir = TempDir::new().unwrap();
        // A temp dir may live inside a repository; only check the fallback
        // when no ancestor has one.
        if find_repository_root(dir.path()).is_none() {
            let root = SearchRoot::resolve(None, dir.path()).unwrap();
            assert_eq!(root.dir, dir.path());
        }
    }

    #[test]
    fn test_root_for_directory_and_file_targets() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("a.txt"), "x\n").unwrap();

        let root = SearchRoot::resolve(Some(Path::new("sub")), dir.path()).unwrap();
        assert_eq!(root.dir, dir.path().join("sub"));
        assert_eq!(root.prompt(), "Ag (in sub): ");

        let root = SearchRoot::resolve(Some(Path::new("sub/a.txt")), dir.path()).unwrap();
        assert_eq!(root.dir, dir.path().join("sub"));
        assert_eq!(root.paths, vec![PathBuf::from("a.txt")]);
        assert_eq!(root.prompt(), "Ag (file a.txt): ");

        assert!(SearchRoot::resolve(Some(Path::new("missing")), dir.path()).is_err());
    }

    #[test]
    fn test_jump_state_preview_then_commit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "bee\n").unwrap();

        let mut opener = TemporaryFileRegistry::default();
        let mut jump = RecordingJump::default();
        let mut state = JumpState::new(&mut opener, &mut jump, dir.path().to_path_buf());

        let previewed = candidate("b.txt:1:1:bee");
        match state.on_action(PickerAction::Preview(&previewed)).unwrap() {
            StateReply::Preview(preview) => assert_eq!(preview.lines, vec![(1, "bee".to_string())]),
            other => panic!("unexpected reply {:?}", other),
        }

        let chosen = candidate("a.txt:2:3:two");
        match state.on_action(PickerAction::Commit(&chosen)).unwrap() {
            StateReply::Jumped(position) => {
                assert_eq!(position.line, 2);
                assert_eq!(position.column, 2);
            }
            other => panic!("unexpected reply {:?}", other),
        }

        // Only the previewed file is temporary.
        assert_eq!(opener.close_if_unused(), 1);
        assert!(opener.workspace().find(&dir.path().join("a.txt")).is_some());
        assert_eq!(jump.positions.len(), 1);
    }

    #[test]
    fn test_jump_state_cancel_closes_previews() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let mut opener = TemporaryFileRegistry::default();
        let mut jump = RecordingJump::default();
        let mut state = JumpState::new(&mut opener, &mut jump, dir.path().to_path_buf());

        let previewed = candidate("a.txt:1:1:one");
        state.on_action(PickerAction::Preview(&previewed)).unwrap();
        assert_eq!(state.on_action(PickerAction::Cancel).unwrap(), StateReply::None);

        assert!(opener.workspace().is_empty());
        assert!(jump.positions.is_empty());
    }
}
