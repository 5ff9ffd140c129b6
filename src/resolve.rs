//! Mapping a selected candidate back to a file position
//!
//! Files are opened through a [`FileOpener`]. The default opener is a
//! [`TemporaryFileRegistry`] over a [`Workspace`] of open buffers: files it
//! had to open only for this session are remembered and closed again by
//! [`FileOpener::release`] unless the user kept them.

use crate::search::Candidate;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

/// An open file.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub id: BufferId,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("Failed to jump to {}: {source}", path.display())]
    Jump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Set of open buffers for one editing session.
#[derive(Debug, Default)]
pub struct Workspace {
    buffers: Vec<Buffer>,
    next_id: u64,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, path: &Path) -> Option<BufferId> {
        self.buffers.iter().find(|b| b.path == path).map(|b| b.id)
    }

    /// Open `path`, or return the buffer already holding it.
    pub fn open(&mut self, path: &Path) -> Result<BufferId, OpenError> {
        if let Some(id) = self.find(path) {
            return Ok(id);
        }
        if path.is_dir() {
            return Err(OpenError::NotAFile(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|source| OpenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.push(Buffer {
            id,
            path: path.to_path_buf(),
            text: String::from_utf8_lossy(&bytes).into_owned(),
        });
        log::debug!("Opened {} as buffer {:?}", path.display(), id);
        Ok(id)
    }

    /// Close a buffer, returning whether it was open.
    pub fn close(&mut self, id: BufferId) -> bool {
        let before = self.buffers.len();
        self.buffers.retain(|b| b.id != id);
        before != self.buffers.len()
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Strategy for opening files during selection.
pub trait FileOpener {
    /// Open `path` (or reuse an open buffer for it).
    fn open(&mut self, path: &Path) -> Result<BufferId, OpenError>;

    /// Keep `id` open after the session ends.
    fn keep(&mut self, id: BufferId);

    /// Close every buffer this opener opened and nobody kept.
    fn release(&mut self);

    fn contents(&self, id: BufferId) -> Option<&str>;
}

/// Remembers which buffers were opened only for this session.
#[derive(Debug, Default)]
pub struct TemporaryFileRegistry {
    workspace: Workspace,
    temporary: Vec<BufferId>,
}

impl TemporaryFileRegistry {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            temporary: Vec::new(),
        }
    }

    /// Open `path`, tracking the buffer if it was not open before.
    pub fn open_or_reuse(&mut self, path: &Path) -> Result<BufferId, OpenError> {
        if let Some(id) = self.workspace.find(path) {
            return Ok(id);
        }
        let id = self.workspace.open(path)?;
        self.temporary.push(id);
        Ok(id)
    }

    /// Close tracked buffers, returning how many were closed.
    pub fn close_if_unused(&mut self) -> usize {
        let closed = self
            .temporary
            .drain(..)
            .filter(|id| self.workspace.close(*id))
            .count();
        if closed > 0 {
            log::debug!("Closed {} temporary buffers", closed);
        }
        closed
    }

    pub fn is_temporary(&self, id: BufferId) -> bool {
        self.temporary.contains(&id)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }
}

impl FileOpener for TemporaryFileRegistry {
    fn open(&mut self, path: &Path) -> Result<BufferId, OpenError> {
        self.open_or_reuse(path)
    }

    fn keep(&mut self, id: BufferId) {
        self.temporary.retain(|t| *t != id);
    }

    fn release(&mut self) {
        self.close_if_unused();
    }

    fn contents(&self, id: BufferId) -> Option<&str> {
        self.workspace.buffer(id).map(|b| b.text.as_str())
    }
}

/// Concrete navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub buffer: BufferId,
    pub path: PathBuf,
    /// 1-based line
    pub line: usize,
    /// 0-based column
    pub column: usize,
}

/// Moves the user to a resolved position.
pub trait Jump {
    fn jump(&mut self, position: &Position) -> std::io::Result<()>;
}

/// Writes `path:line:column` with a 1-based column.
pub struct PrintLocation<W: Write> {
    out: W,
}

impl<W: Write> PrintLocation<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Jump for PrintLocation<W> {
    fn jump(&mut self, position: &Position) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{}:{}:{}",
            position.path.display(),
            position.line,
            position.column + 1
        )?;
        self.out.flush()
    }
}

/// Runs `$VISUAL` or `$EDITOR` (falling back to `vi`) as `<editor> +<line> <path>`.
#[derive(Debug, Clone)]
pub struct EditorJump {
    editor: String,
}

impl EditorJump {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
        }
    }

    pub fn from_env() -> Self {
        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .ok()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "vi".to_string());
        Self::new(editor)
    }

    pub fn editor(&self) -> &str {
        &self.editor
    }

    /// Editor command line for `position`; the editor string may carry flags.
    pub fn command_line(&self, position: &Position) -> Vec<String> {
        let mut argv: Vec<String> = self.editor.split_whitespace().map(str::to_string).collect();
        argv.push(format!("+{}", position.line));
        argv.push(position.path.to_string_lossy().into_owned());
        argv
    }
}

impl Jump for EditorJump {
    fn jump(&mut self, position: &Position) -> std::io::Result<()> {
        let argv = self.command_line(position);
        let Some((program, args)) = argv.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty editor command",
            ));
        };
        log::info!("Launching editor: {:?}", argv);
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            log::warn!("Editor exited with {}", status);
        }
        Ok(())
    }
}

/// Resolve `selection` and jump to it.
///
/// No selection means the user cancelled: temporary files are released and
/// nothing is opened. Paths of candidates are relative to `root`.
pub fn resolve<O, J>(
    selection: Option<&Candidate>,
    root: &Path,
    opener: &mut O,
    jump: &mut J,
) -> Result<Option<Position>, ResolveError>
where
    O: FileOpener + ?Sized,
    J: Jump + ?Sized,
{
    let Some(candidate) = selection else {
        opener.release();
        return Ok(None);
    };

    let location = candidate.location();
    let path = root.join(&*location.path);
    let buffer = opener.open(&path)?;
    opener.keep(buffer);

    let position = Position {
        buffer,
        path,
        line: location.line,
        column: location.column.saturating_sub(1),
    };
    jump.jump(&position).map_err(|source| ResolveError::Jump {
        path: position.path.clone(),
        source,
    })?;
    Ok(Some(position))
}
