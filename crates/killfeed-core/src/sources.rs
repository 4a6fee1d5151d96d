//! Concrete ports for local runs: a local file standing in for the remote feed,
//! and player lists read from a file or an external command.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::Command;

use crate::error::{KillfeedError, Result};
use crate::presence::PlayerListSource;
use crate::tailer::FeedSource;

/// Reads the kill feed from the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct LocalFileFeed;

impl FeedSource for LocalFileFeed {
    fn stat(&self, path: &str) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_from(&self, path: &str, offset: u64) -> Result<(Vec<u8>, u64)> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let end = offset + bytes.len() as u64;
        Ok((bytes, end))
    }
}

/// Player list kept in a text file that something else refreshes.
#[derive(Debug, Clone)]
pub struct FilePlayerList {
    path: PathBuf,
}

impl FilePlayerList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlayerListSource for FilePlayerList {
    fn fetch_player_list(&self) -> Result<Option<String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KillfeedError::TransientIo(format!(
                "read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Runs an external program (for example an RCON client) and uses its stdout.
#[derive(Debug, Clone)]
pub struct CommandPlayerList {
    program: String,
    args: Vec<String>,
}

impl CommandPlayerList {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a shell-like command line on whitespace. No quoting support.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| KillfeedError::Config("player list command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl PlayerListSource for CommandPlayerList {
    fn fetch_player_list(&self) -> Result<Option<String>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| KillfeedError::TransientIo(format!("spawn {}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(KillfeedError::TransientIo(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_local_feed_reads_from_offset() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello\nworld\n").unwrap();
        let path = tmp.path().to_str().unwrap();
        let feed = LocalFileFeed;
        assert_eq!(feed.stat(path).unwrap(), 12);
        let (bytes, end) = feed.read_from(path, 6).unwrap();
        assert_eq!(bytes, b"world\n");
        assert_eq!(end, 12);
    }

    #[test]
    fn test_local_feed_missing_file() {
        assert!(LocalFileFeed.stat("/nonexistent/killfeed.log").is_err());
    }

    #[test]
    fn test_file_player_list() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PlayerList Rex, Ann").unwrap();
        let source = FilePlayerList::new(tmp.path());
        assert_eq!(source.fetch_player_list().unwrap().as_deref(), Some("PlayerList Rex, Ann"));
        let missing = FilePlayerList::new("/nonexistent/players.txt");
        assert_eq!(missing.fetch_player_list().unwrap(), None);
    }

    #[test]
    fn test_command_line_split() {
        let cmd = CommandPlayerList::from_command_line("rcon-cli --host 1.2.3.4 playerlist").unwrap();
        assert_eq!(cmd.program, "rcon-cli");
        assert_eq!(cmd.args, vec!["--host", "1.2.3.4", "playerlist"]);
        assert!(CommandPlayerList::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_player_list_stdout() {
        let cmd = CommandPlayerList::new("echo", vec!["Rex,".into(), "Ann".into()]);
        assert_eq!(cmd.fetch_player_list().unwrap().as_deref(), Some("Rex, Ann\n"));
        let failing = CommandPlayerList::new("false", vec![]);
        assert!(matches!(
            failing.fetch_player_list(),
            Err(KillfeedError::TransientIo(_))
        ));
    }
}
