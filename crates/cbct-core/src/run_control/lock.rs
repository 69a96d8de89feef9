//! Exclusive access to the job control file.
//!
//! The record is rewritten in place and terminated by a NUL byte; bytes past
//! the terminator are left over from longer records and are ignored.

use crate::common::constants::{
    CONTROL_FILE_BUFFER, CONTROL_FILE_OPEN_ATTEMPTS, LOCK_ATTEMPTS_PER_ROUND, LOCK_ROUNDS,
};
use crate::domain::{CbctError, CbctResult, codes};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Bounded retries for opening and locking the control file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub rounds: u32,
    pub attempts_per_round: u32,
    pub open_attempts: u32,
    pub pause: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            rounds: LOCK_ROUNDS,
            attempts_per_round: LOCK_ATTEMPTS_PER_ROUND,
            open_attempts: CONTROL_FILE_OPEN_ATTEMPTS,
            pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct ControlFile {
    file: File,
    path: PathBuf,
    locked: bool,
    policy: LockPolicy,
}

impl ControlFile {
    /// Creates a control file that must not exist yet and returns it locked.
    pub fn create(path: &Path, policy: LockPolicy) -> CbctResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|error| {
                CbctError::io_system(
                    codes::IO_JCF_CREATE,
                    format!("failed to create job control file '{}': {error}", path.display()),
                )
            })?;
        let mut control = Self {
            file,
            path: path.to_path_buf(),
            locked: false,
            policy,
        };
        control.lock()?;
        Ok(control)
    }

    /// Opens an existing control file, waiting for its creator if needed.
    pub fn open(path: &Path, policy: LockPolicy) -> CbctResult<Self> {
        let mut last_error = None;
        for attempt in 0..policy.open_attempts.max(1) {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                        locked: false,
                        policy,
                    });
                }
                Err(error) => last_error = Some(error),
            }
            if attempt + 1 < policy.open_attempts {
                thread::sleep(policy.pause);
            }
        }
        Err(CbctError::io_system(
            codes::IO_JCF_OPEN,
            format!(
                "failed to open job control file '{}': {}",
                path.display(),
                last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string())
            ),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) -> CbctResult<()> {
        if self.locked {
            return Ok(());
        }
        for round in 0..self.policy.rounds {
            for _ in 0..self.policy.attempts_per_round {
                match self.file.try_lock() {
                    Ok(()) => {
                        self.locked = true;
                        return Ok(());
                    }
                    Err(TryLockError::WouldBlock) => thread::sleep(self.policy.pause),
                    Err(TryLockError::Error(error)) => {
                        return Err(CbctError::io_system(
                            codes::IO_JCF_LOCK,
                            format!("failed to lock '{}': {error}", self.path.display()),
                        ));
                    }
                }
            }
            warn!(
                round = round + 1,
                attempts = self.policy.attempts_per_round,
                path = %self.path.display(),
                "job control file still locked"
            );
        }
        Err(CbctError::io_system(
            codes::IO_JCF_LOCK,
            format!(
                "gave up locking '{}' after {} attempts",
                self.path.display(),
                self.policy.rounds * self.policy.attempts_per_round
            ),
        ))
    }

    pub fn unlock(&mut self) -> CbctResult<()> {
        if !self.locked {
            return Ok(());
        }
        self.file.unlock().map_err(|error| {
            CbctError::io_system(
                codes::IO_JCF_LOCK,
                format!("failed to unlock '{}': {error}", self.path.display()),
            )
        })?;
        self.locked = false;
        Ok(())
    }

    fn rewind(&mut self) -> CbctResult<()> {
        self.lock()?;
        self.file
            .seek(SeekFrom::Start(0))
            .map(|_| ())
            .map_err(|error| self.io_error(codes::IO_JCF_READ, "rewind", error))
    }

    /// Locks the file and reads the record. The lock is kept for the
    /// following [`write_record`](Self::write_record) unless reading fails.
    pub fn read_record(&mut self) -> CbctResult<String> {
        self.rewind()?;
        let mut buffer = vec![0_u8; CONTROL_FILE_BUFFER - 1];
        let read = match self.file.read(&mut buffer) {
            Ok(0) => {
                self.unlock()?;
                return Err(CbctError::io_system(
                    codes::IO_JCF_READ,
                    format!("job control file '{}' is empty", self.path.display()),
                ));
            }
            Ok(read) => read,
            Err(error) => {
                self.unlock()?;
                return Err(self.io_error(codes::IO_JCF_READ, "read", error));
            }
        };
        let end = buffer[..read].iter().position(|b| *b == 0).unwrap_or(read);
        Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }

    /// Writes the record followed by its NUL terminator and releases the lock.
    pub fn write_record(&mut self, record: &str) -> CbctResult<()> {
        self.rewind()?;
        let mut bytes = record.as_bytes().to_vec();
        bytes.push(0);
        let written = self.file.write_all(&bytes).and_then(|()| self.file.flush());
        self.unlock()?;
        written.map_err(|error| self.io_error(codes::IO_JCF_WRITE, "write", error))
    }

    fn io_error(&self, code: &'static str, action: &str, error: std::io::Error) -> CbctError {
        CbctError::io_system(
            code,
            format!(
                "failed to {action} job control file '{}': {error}",
                self.path.display()
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlFile, LockPolicy};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick() -> LockPolicy {
        LockPolicy {
            rounds: 2,
            attempts_per_round: 2,
            open_attempts: 2,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn shorter_records_are_read_up_to_their_terminator() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("scan.lock");
        let mut control = ControlFile::create(&path, quick()).expect("control file should be created");
        assert!(control.is_locked());
        control
            .write_record("1000 0 3 1 2 3 4 5 6 ")
            .expect("record should be written");
        assert!(!control.is_locked());
        control.write_record("1 2 ").expect("record should be written");

        let raw = fs::read(&path).expect("control file should be readable");
        assert_eq!(&raw[..5], b"1 2 \0");
        assert_eq!(control.read_record().expect("record should be read"), "1 2 ");
        assert!(control.is_locked());
    }

    #[test]
    fn second_creator_is_refused() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("scan.lock");
        let _first = ControlFile::create(&path, quick()).expect("control file should be created");
        let error = ControlFile::create(&path, quick()).expect_err("file already exists");
        assert_eq!(error.code(), "IO.JCF_CREATE");
    }

    #[test]
    fn held_lock_makes_other_openers_give_up() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("scan.lock");
        let holder = ControlFile::create(&path, quick()).expect("control file should be created");
        let mut other = ControlFile::open(&path, quick()).expect("control file should open");
        let error = other.read_record().expect_err("lock is held elsewhere");
        assert_eq!(error.code(), "IO.JCF_LOCK");
        assert_eq!(error.exit_code(), 3);
        drop(holder);
        other.lock().expect("lock is free once the holder is gone");
    }

    #[test]
    fn missing_control_file_fails_after_bounded_retries() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = ControlFile::open(&temp.path().join("absent.lock"), quick())
            .expect_err("nothing to open");
        assert_eq!(error.code(), "IO.JCF_OPEN");
    }
}
