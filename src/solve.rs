//! Tabled top-down evaluation.
//!
//! One query owns one `Solver`: an arena of subgoals plus a table keying
//! them by variant tag, so alpha-equivalent goals share their derived
//! facts. Waiters carry a pending clause back upstream to the subgoal that
//! is waiting on it; whenever a subgoal gains a fact, every waiter is
//! resolved against it and the resolvent re-enters the search. The fixed
//! point is implicit: recursion unwinds once no call adjoins a new fact.
//!
//! Termination holds because clauses are safe and the logic is
//! function-free: finitely many ground facts exist per predicate, fact sets
//! deduplicate by ground identity, and each variant tag is searched once.

use crate::db::Database;
use crate::logic::{
    rename_clause, rename_literal, substitute, substitute_clause, unify, Clause, FreshVars,
    Literal, Term,
};
use hashbrown::HashMap;
use rayon::prelude::*;
use std::fmt;

/// Answers for one query: every derived fact matching the goal, as term
/// tuples, each exactly once, in no particular order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub name: Box<str>,
    pub arity: u32,
    pub answers: Vec<Vec<Term>>,
}

/// Only primitives can fail a query; everything else just yields no
/// answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    Primitive {
        predicate: Box<str>,
        message: Box<str>,
    },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::Primitive { predicate, message } => {
                write!(f, "primitive '{predicate}' failed: {message}")
            }
        }
    }
}

impl std::error::Error for EvalError {}

type SubgoalId = usize;

struct Waiter {
    clause: Clause,
    goal: SubgoalId,
}

struct Subgoal {
    literal: Literal,
    facts: HashMap<Box<str>, Literal>,
    waiters: Vec<Waiter>,
}

impl Subgoal {
    fn new(literal: Literal) -> Self {
        Self {
            literal,
            facts: HashMap::new(),
            waiters: Vec::new(),
        }
    }
}

struct Solver<'a, D: ?Sized> {
    db: &'a D,
    table: HashMap<Box<str>, SubgoalId>,
    subgoals: Vec<Subgoal>,
    fresh: FreshVars,
}

/// Compute every stored-and-derived fact matching `goal`.
pub fn ask<D: Database + ?Sized>(db: &D, goal: &Literal) -> Result<QueryResult, EvalError> {
    let mut solver = Solver {
        db,
        table: HashMap::new(),
        subgoals: Vec::new(),
        fresh: FreshVars::new(),
    };
    let root = solver.merge(goal.clone());
    solver.search(root)?;

    let answers = solver.subgoals[root]
        .facts
        .values()
        .map(|f| f.terms.clone())
        .collect();
    Ok(QueryResult {
        name: goal.pred.name.clone(),
        arity: goal.pred.arity,
        answers,
    })
}

/// Independent queries fanned out over a shared synchronized database.
/// Results come back in goal order.
pub fn ask_many<D>(db: &D, goals: &[Literal]) -> Result<Vec<QueryResult>, EvalError>
where
    D: Database + Sync + ?Sized,
{
    goals.par_iter().map(|g| ask(db, g)).collect()
}

impl<'a, D: Database + ?Sized> Solver<'a, D> {
    fn merge(&mut self, literal: Literal) -> SubgoalId {
        let id = self.subgoals.len();
        self.table.insert(literal.tag(), id);
        self.subgoals.push(Subgoal::new(literal));
        id
    }

    /// Seed a subgoal from the database: primitive hook first, then every
    /// stored clause whose renamed head unifies with the goal.
    fn search(&mut self, sg: SubgoalId) -> Result<(), EvalError> {
        let goal = self.subgoals[sg].literal.clone();
        if let Some(hook) = goal.pred.primitive().cloned() {
            let injected = hook(&goal).map_err(|message| EvalError::Primitive {
                predicate: goal.pred.id().into(),
                message,
            })?;
            for fact in injected {
                self.fact(sg, fact)?;
            }
        }
        for clause in self.db.clauses(&goal.pred) {
            let renamed = rename_clause(&clause, &mut self.fresh);
            if let Some(env) = unify(&goal, &renamed.head) {
                let instance = substitute_clause(&renamed, &env);
                self.add_clause(sg, instance)?;
            }
        }
        Ok(())
    }

    fn add_clause(&mut self, sg: SubgoalId, c: Clause) -> Result<(), EvalError> {
        match c.body.first() {
            None => self.fact(sg, c.head),
            Some(selected) => {
                let selected = selected.clone();
                self.rule(sg, c, selected)
            }
        }
    }

    /// Adjoin a derived fact and push it through every registered waiter.
    fn fact(&mut self, sg: SubgoalId, l: Literal) -> Result<(), EvalError> {
        let key = l.id();
        if self.subgoals[sg].facts.contains_key(&*key) {
            return Ok(());
        }
        self.subgoals[sg].facts.insert(key, l.clone());

        // Propagation may register further waiters on this subgoal; they
        // replay the fact set themselves, so only the current list is fed.
        let waiters: Vec<(Clause, SubgoalId)> = self.subgoals[sg]
            .waiters
            .iter()
            .map(|w| (w.clause.clone(), w.goal))
            .collect();
        for (clause, goal) in waiters {
            if let Some(resolvent) = self.resolve(&clause, &l) {
                self.add_clause(goal, resolvent)?;
            }
        }
        Ok(())
    }

    /// Suspend `c` on the subgoal of its selected literal, creating that
    /// subgoal if this is the first time its variant shows up.
    fn rule(&mut self, sg: SubgoalId, c: Clause, selected: Literal) -> Result<(), EvalError> {
        let tag = selected.tag();
        if let Some(&producer) = self.table.get(&*tag) {
            self.subgoals[producer].waiters.push(Waiter {
                clause: c.clone(),
                goal: sg,
            });
            // Snapshot before replaying: resolvents can extend the very
            // fact set being walked.
            let known: Vec<Literal> = self.subgoals[producer].facts.values().cloned().collect();
            for fact in known {
                if let Some(resolvent) = self.resolve(&c, &fact) {
                    self.add_clause(sg, resolvent)?;
                }
            }
            Ok(())
        } else {
            let id = self.subgoals.len();
            self.table.insert(tag, id);
            let mut subgoal = Subgoal::new(selected);
            subgoal.waiters.push(Waiter { clause: c, goal: sg });
            self.subgoals.push(subgoal);
            self.search(id)
        }
    }

    /// Reduce a suspended clause by one body literal. Renaming the fact
    /// apart is vacuous for ground facts but matters when a primitive
    /// injected a literal with variables.
    fn resolve(&mut self, c: &Clause, fact: &Literal) -> Option<Clause> {
        let selected = c.body.first()?;
        let renamed = rename_literal(fact, &mut self.fresh);
        let env = unify(selected, &renamed)?;
        Some(Clause {
            head: substitute(&c.head, &env),
            body: c.body[1..].iter().map(|l| substitute(l, &env)).collect(),
        })
    }
}
