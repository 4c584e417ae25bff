//! Clause store and predicate registry.
//!
//! Predicate identity (`name/arity`) is separate from the clause set, which
//! the database owns. Two flavors share one registry implementation: an
//! unsynchronized in-memory database for single-threaded use, and a
//! reader-writer locked one that supports queries running concurrently with
//! each other and linearized against mutations.

use crate::logic::{Clause, Literal, Predicate, Primitive};
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Head variables missing from the body; rejecting these keeps every
    /// query finite.
    UnsafeClause { clause: Box<str> },
    /// Stored clauses and a primitive implementation cannot mix.
    PrimitiveTarget { predicate: Box<str> },
    /// Underlying writer failure, message preserved.
    Io { message: Box<str> },
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::UnsafeClause { clause } => {
                write!(f, "cannot assert unsafe clause '{clause}'")
            }
            DbError::PrimitiveTarget { predicate } => {
                write!(f, "predicate '{predicate}' cannot mix stored clauses with a primitive")
            }
            DbError::Io { message } => write!(f, "log I/O error: {message}"),
        }
    }
}

impl std::error::Error for DbError {}

/// What the evaluator and command application need from a clause store.
///
/// `clauses` returns a snapshot so no lock or borrow is held while the
/// evaluator recurses over it.
pub trait Database {
    /// Descriptor for `name/arity`, created on first mention. Repeated
    /// calls return the same shared descriptor.
    fn intern(&self, name: &str, arity: u32) -> Arc<Predicate>;

    /// Store a clause. Fails on unsafe clauses and primitive targets,
    /// otherwise idempotent.
    fn assert(&self, c: Clause) -> Result<(), DbError>;

    /// Remove a clause by identity. Retracting a clause that was never
    /// asserted succeeds silently; retracting the last clause of a
    /// predicate drops the predicate from the registry.
    fn retract(&self, c: &Clause) -> Result<(), DbError>;

    /// Snapshot of the clauses currently stored for a predicate.
    fn clauses(&self, pred: &Predicate) -> Vec<Arc<Clause>>;

    /// Install a primitive implementation. Must happen before the
    /// predicate holds any stored clause.
    fn register_primitive(
        &self,
        name: &str,
        arity: u32,
        hook: Primitive,
    ) -> Result<Arc<Predicate>, DbError>;
}

// ================== registry ==================

struct PredEntry {
    pred: Arc<Predicate>,
    clauses: HashMap<Box<str>, Arc<Clause>>,
}

#[derive(Default)]
struct Registry {
    preds: HashMap<Box<str>, PredEntry>,
}

impl Registry {
    fn lookup(&self, name: &str, arity: u32) -> Option<Arc<Predicate>> {
        self.preds
            .get(&*Predicate::identity(name, arity))
            .map(|e| e.pred.clone())
    }

    fn intern(&mut self, name: &str, arity: u32) -> Arc<Predicate> {
        let key = Predicate::identity(name, arity);
        if let Some(entry) = self.preds.get(&*key) {
            return entry.pred.clone();
        }
        let pred = Arc::new(Predicate::new(name, arity));
        self.preds.insert(
            key,
            PredEntry {
                pred: pred.clone(),
                clauses: HashMap::new(),
            },
        );
        pred
    }

    fn register_primitive(
        &mut self,
        name: &str,
        arity: u32,
        hook: Primitive,
    ) -> Result<Arc<Predicate>, DbError> {
        let key = Predicate::identity(name, arity);
        if let Some(entry) = self.preds.get(&*key) {
            if !entry.clauses.is_empty() {
                return Err(DbError::PrimitiveTarget { predicate: key });
            }
        }
        let pred = Arc::new(Predicate::with_primitive(name, arity, hook));
        self.preds.insert(
            key,
            PredEntry {
                pred: pred.clone(),
                clauses: HashMap::new(),
            },
        );
        Ok(pred)
    }

    fn assert(&mut self, c: Clause) -> Result<(), DbError> {
        if !c.is_safe() {
            return Err(DbError::UnsafeClause {
                clause: c.to_string().into(),
            });
        }
        let pred = c.head.pred.clone();
        let entry = self
            .preds
            .entry(Box::from(pred.id()))
            .or_insert_with(|| PredEntry {
                pred,
                clauses: HashMap::new(),
            });
        if entry.pred.is_primitive() {
            return Err(DbError::PrimitiveTarget {
                predicate: entry.pred.id().into(),
            });
        }
        entry.clauses.insert(c.id(), Arc::new(c));
        Ok(())
    }

    fn retract(&mut self, c: &Clause) -> Result<(), DbError> {
        let key = c.head.pred.id();
        let Some(entry) = self.preds.get_mut(key) else {
            return Ok(());
        };
        if entry.pred.is_primitive() {
            return Err(DbError::PrimitiveTarget {
                predicate: key.into(),
            });
        }
        entry.clauses.remove(&*c.id());
        if entry.clauses.is_empty() {
            self.preds.remove(key);
        }
        Ok(())
    }

    fn clauses(&self, pred: &Predicate) -> Vec<Arc<Clause>> {
        self.preds
            .get(pred.id())
            .map(|e| e.clauses.values().cloned().collect())
            .unwrap_or_default()
    }
}

// ================== unsynchronized mode ==================

/// In-memory database without locking. `!Sync` by construction: the type
/// itself enforces that no query runs while another thread mutates.
#[derive(Default)]
pub struct MemDatabase {
    reg: RefCell<Registry>,
}

impl MemDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemDatabase {
    fn intern(&self, name: &str, arity: u32) -> Arc<Predicate> {
        self.reg.borrow_mut().intern(name, arity)
    }

    fn assert(&self, c: Clause) -> Result<(), DbError> {
        self.reg.borrow_mut().assert(c)
    }

    fn retract(&self, c: &Clause) -> Result<(), DbError> {
        self.reg.borrow_mut().retract(c)
    }

    fn clauses(&self, pred: &Predicate) -> Vec<Arc<Clause>> {
        self.reg.borrow().clauses(pred)
    }

    fn register_primitive(
        &self,
        name: &str,
        arity: u32,
        hook: Primitive,
    ) -> Result<Arc<Predicate>, DbError> {
        self.reg.borrow_mut().register_primitive(name, arity, hook)
    }
}

// ================== reader-writer mode ==================

/// In-memory database behind a single reader-writer lock. Queries take
/// shared holds and may run in parallel; assert and retract take the
/// exclusive hold. Each query sees the store as of some point in the
/// linearization of mutations.
#[derive(Default)]
pub struct LockingDatabase {
    reg: RwLock<Registry>,
}

impl LockingDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for LockingDatabase {
    fn intern(&self, name: &str, arity: u32) -> Arc<Predicate> {
        // read-lock fast path, write-lock only on first mention
        if let Some(p) = self.reg.read().unwrap().lookup(name, arity) {
            return p;
        }
        self.reg.write().unwrap().intern(name, arity)
    }

    fn assert(&self, c: Clause) -> Result<(), DbError> {
        self.reg.write().unwrap().assert(c)
    }

    fn retract(&self, c: &Clause) -> Result<(), DbError> {
        self.reg.write().unwrap().retract(c)
    }

    fn clauses(&self, pred: &Predicate) -> Vec<Arc<Clause>> {
        self.reg.read().unwrap().clauses(pred)
    }

    fn register_primitive(
        &self,
        name: &str,
        arity: u32,
        hook: Primitive,
    ) -> Result<Arc<Predicate>, DbError> {
        self.reg.write().unwrap().register_primitive(name, arity, hook)
    }
}

/// Literal over an interned predicate, the shape the evaluator consumes.
pub fn build_literal<D: Database + ?Sized>(db: &D, predicate: &str, terms: Vec<crate::logic::Term>) -> Literal {
    let pred = db.intern(predicate, terms.len() as u32);
    Literal::new(pred, terms)
}
