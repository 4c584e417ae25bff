//! Append-only persistence log.
//!
//! The log speaks the engine's own textual syntax: every accepted assert is
//! appended as `clause.` and every accepted retract as `clause~`, one per
//! line. Opening a database over an existing log replays it into the
//! backing store first, without writing anything back. Queries never touch
//! the log.

use crate::db::{Database, DbError};
use crate::logic::{Clause, Predicate, Primitive};
use crate::parser::CommandParser;
use crate::{apply, DatalogError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A database whose mutations are mirrored to an append-only text file
/// after the backing store accepts them.
pub struct LogDatabase<D> {
    log: Mutex<File>,
    backing: D,
}

impl<D: Database> LogDatabase<D> {
    /// Replay `path` into `backing` (if the file exists), then open the
    /// log for appending.
    pub fn open<P: AsRef<Path>>(path: P, backing: D) -> Result<Self, DatalogError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let mut parser = CommandParser::new(&text);
                while let Some(cmd) = parser.next_command()? {
                    apply(&backing, &cmd)?;
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(e).into()),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DatalogError::from(io_error(e)))?;
        Ok(Self {
            log: Mutex::new(file),
            backing,
        })
    }

    pub fn backing(&self) -> &D {
        &self.backing
    }

    fn append(&self, c: &Clause, terminator: char) -> Result<(), DbError> {
        let line = format!("{c}{terminator}\n");
        let mut file = self.log.lock().unwrap();
        file.write_all(line.as_bytes()).map_err(io_error)
    }
}

fn io_error(e: std::io::Error) -> DbError {
    DbError::Io {
        message: e.to_string().into(),
    }
}

impl<D: Database> Database for LogDatabase<D> {
    fn intern(&self, name: &str, arity: u32) -> Arc<Predicate> {
        self.backing.intern(name, arity)
    }

    fn assert(&self, c: Clause) -> Result<(), DbError> {
        self.backing.assert(c.clone())?;
        self.append(&c, '.')
    }

    fn retract(&self, c: &Clause) -> Result<(), DbError> {
        self.backing.retract(c)?;
        self.append(c, '~')
    }

    fn clauses(&self, pred: &Predicate) -> Vec<Arc<Clause>> {
        self.backing.clauses(pred)
    }

    fn register_primitive(
        &self,
        name: &str,
        arity: u32,
        hook: Primitive,
    ) -> Result<Arc<Predicate>, DbError> {
        self.backing.register_primitive(name, arity, hook)
    }
}
