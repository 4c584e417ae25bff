//! Tabled Datalog engine.
//!
//! Programs are sequences of commands: assertions (`.`), retractions (`~`)
//! and queries (`?`) over function-free first-order literals. Queries are
//! answered top-down with tabling, so recursive programs such as transitive
//! closure terminate and every answer comes back exactly once.
//!
//! ```
//! use tablog::{run_program, render_results, MemDatabase};
//!
//! let db = MemDatabase::new();
//! let results = run_program(
//!     &db,
//!     "edge(a, b). edge(b, c).
//!      path(X, Y) :- edge(X, Y).
//!      path(X, Y) :- edge(X, Z), path(Z, Y).
//!      path(a, Y)?",
//! )
//! .unwrap();
//! let rendered = render_results(&results);
//! let mut lines: Vec<&str> = rendered.lines().collect();
//! lines.sort();
//! assert_eq!(lines, ["path(a, b).", "path(a, c)."]);
//! ```

pub mod db;
pub mod logdb;
pub mod logic;
pub mod parser;
pub mod solve;

pub use db::{Database, DbError, LockingDatabase, MemDatabase};
pub use logdb::LogDatabase;
pub use logic::{Clause, Literal, Predicate, Primitive, Term};
pub use parser::{parse_program, Command, CommandKind, CommandParser, LiteralDef, ParseError};
pub use solve::{ask, ask_many, EvalError, QueryResult};

use std::fmt;
use std::path::Path;
use std::{fs, process};

#[derive(Debug, Clone, PartialEq)]
pub enum DatalogError {
    Parse(ParseError),
    Db(DbError),
    Eval(EvalError),
}

impl fmt::Display for DatalogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatalogError::Parse(e) => write!(f, "{e}"),
            DatalogError::Db(e) => write!(f, "{e}"),
            DatalogError::Eval(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DatalogError {}

impl From<ParseError> for DatalogError {
    fn from(e: ParseError) -> Self {
        DatalogError::Parse(e)
    }
}

impl From<DbError> for DatalogError {
    fn from(e: DbError) -> Self {
        DatalogError::Db(e)
    }
}

impl From<EvalError> for DatalogError {
    fn from(e: EvalError) -> Self {
        DatalogError::Eval(e)
    }
}

fn build_literal<D: Database + ?Sized>(db: &D, def: &LiteralDef) -> Literal {
    db::build_literal(db, &def.predicate, def.terms.clone())
}

/// Apply one command. Asserts and retracts yield nothing; queries yield
/// their result.
pub fn apply<D: Database + ?Sized>(
    db: &D,
    cmd: &Command,
) -> Result<Option<QueryResult>, DatalogError> {
    let head = build_literal(db, &cmd.head);
    match cmd.kind {
        CommandKind::Assert => {
            let body = cmd.body.iter().map(|l| build_literal(db, l)).collect();
            db.assert(Clause { head, body })?;
            Ok(None)
        }
        CommandKind::Retract => {
            let body = cmd.body.iter().map(|l| build_literal(db, l)).collect();
            db.retract(&Clause { head, body })?;
            Ok(None)
        }
        CommandKind::Query => Ok(Some(solve::ask(db, &head)?)),
    }
}

/// Apply commands in order, collecting the query results.
pub fn apply_all<D: Database + ?Sized>(
    db: &D,
    cmds: &[Command],
) -> Result<Vec<QueryResult>, DatalogError> {
    let mut results = Vec::new();
    for cmd in cmds {
        if let Some(res) = apply(db, cmd)? {
            results.push(res);
        }
    }
    Ok(results)
}

/// Parse and apply a whole program.
pub fn run_program<D: Database + ?Sized>(
    db: &D,
    source: &str,
) -> Result<Vec<QueryResult>, DatalogError> {
    let mut parser = CommandParser::new(source);
    let mut results = Vec::new();
    while let Some(cmd) = parser.next_command()? {
        if let Some(res) = apply(db, &cmd)? {
            results.push(res);
        }
    }
    Ok(results)
}

/// One line per answer, itself a valid assertion program.
pub fn render_results(results: &[QueryResult]) -> String {
    let mut out = String::new();
    for result in results {
        for answer in &result.answers {
            out.push_str(&result.name);
            if result.arity > 0 {
                out.push('(');
                for (i, term) in answer.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(term.name());
                }
                out.push(')');
            }
            out.push_str(".\n");
        }
    }
    out
}

/// Run the given files against one database, printing rendered query
/// results as each file completes. On the first I/O, parse, or database
/// error, print it to stderr and exit(1). Intended for CLI use.
pub fn run_many_or_exit<D: Database + ?Sized, P: AsRef<Path>>(db: &D, files: &[P]) {
    for path in files {
        let path = path.as_ref();
        let src = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                process::exit(1);
            }
        };
        match run_program(db, &src) {
            Ok(results) => print!("{}", render_results(&results)),
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn answers(src: &str) -> HashSet<String> {
        let db = MemDatabase::new();
        let results = run_program(&db, src).unwrap();
        render_results(&results).lines().map(str::to_string).collect()
    }

    fn set(lines: &[&str]) -> HashSet<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mutual_recursion_converges() {
        assert_eq!(
            answers("q(X) :- p(X).  q(a).  p(X) :- q(X).  q(X)?"),
            set(&["q(a)."])
        );
    }

    #[test]
    fn transitive_closure_over_a_cycle() {
        let src = "edge(a,b). edge(b,c). edge(c,d). edge(d,a).
                   path(X,Y) :- edge(X,Y).
                   path(X,Y) :- edge(X,Z), path(Z,Y).
                   path(X,Y) :- path(X,Z), edge(Z,Y).
                   path(X,Y)?";
        let mut expected = HashSet::new();
        for x in ["a", "b", "c", "d"] {
            for y in ["a", "b", "c", "d"] {
                expected.insert(format!("path({x}, {y})."));
            }
        }
        assert_eq!(answers(src), expected);
    }

    #[test]
    fn delegation_chains_grant_permissions() {
        let src = "contains(ca,store,rams_couch,rams).
                   contains(rams,fetch,rams_couch,will).
                   contains(ca,fetch,Name,Watcher) :- contains(ca,store,Name,Owner), contains(Owner,fetch,Name,Watcher).
                   trusted(ca).
                   permit(User,Priv,Name) :- contains(Auth,Priv,Name,User), trusted(Auth).
                   permit(User,Priv,Name)?";
        assert_eq!(
            answers(src),
            set(&[
                "permit(rams, store, rams_couch).",
                "permit(will, fetch, rams_couch).",
            ])
        );
    }

    #[test]
    fn retraction_removes_answers() {
        assert_eq!(
            answers("foo(a,b). foo(b,c). foo(a,b)~ foo(X,Y)?"),
            set(&["foo(b, c)."])
        );
    }

    #[test]
    fn zero_arity_queries() {
        assert_eq!(answers("true.  true?"), set(&["true."]));
    }

    #[test]
    fn recursion_with_filtering_body() {
        let src = "r(X,Y) :- r(X,Z), r(Z,Y).
                   r(X,Y) :- p(X,Y), q(Y).
                   p(a,b). p(b,d). p(b,c).
                   q(b). q(c).
                   r(a,Y)?";
        assert_eq!(answers(src), set(&["r(a, b).", "r(a, c)."]));
    }

    #[test]
    fn variant_queries_share_answer_sets() {
        let src = "edge(a,b). edge(b,c).
                   path(X,Y) :- edge(X,Y).
                   path(X,Y) :- edge(X,Z), path(Z,Y).";
        let a = answers(&format!("{src} path(U,V)?"));
        let b = answers(&format!("{src} path(From,To)?"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn assert_twice_retract_once_restores_prior_state() {
        // clause identity makes repeated assertion idempotent, so one
        // retraction undoes both
        assert_eq!(answers("p(a). p(a). p(a)~ p(X)?"), HashSet::new());
    }

    #[test]
    fn unsafe_assertions_are_rejected() {
        let db = MemDatabase::new();
        let err = run_program(&db, "p(X) :- q(Y). ").unwrap_err();
        assert!(matches!(err, DatalogError::Db(DbError::UnsafeClause { .. })));

        // nothing was stored
        assert_eq!(run_program(&db, "q(a). p(X)?").unwrap()[0].answers.len(), 0);
    }

    #[test]
    fn queries_before_errors_still_apply() {
        let db = MemDatabase::new();
        let err = run_program(&db, "p(a). p(X)? r(").unwrap_err();
        assert!(matches!(err, DatalogError::Parse(_)));
        // the assert before the parse error took effect
        let results = run_program(&db, "p(X)?").unwrap();
        assert_eq!(results[0].answers.len(), 1);
    }

    #[test]
    fn rendering_is_a_valid_program() {
        let db = MemDatabase::new();
        let results =
            run_program(&db, "edge(a,b). edge(b,c). edge(X,Y)?").unwrap();
        let rendered = render_results(&results);

        let reloaded = MemDatabase::new();
        run_program(&reloaded, &rendered).unwrap();
        let again = run_program(&reloaded, "edge(X,Y)?").unwrap();
        assert_eq!(again[0].answers.len(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn edge_program(edges: &HashSet<(u8, u8)>) -> String {
            let mut src = String::new();
            for (a, b) in edges {
                src.push_str(&format!("edge(n{a}, n{b}). "));
            }
            src
        }

        fn reachable(edges: &HashSet<(u8, u8)>, limit: u8) -> HashSet<(u8, u8)> {
            // reference closure by iteration to a fixed point
            let mut closure: HashSet<(u8, u8)> = edges.clone();
            loop {
                let mut next = closure.clone();
                for &(a, b) in &closure {
                    for c in 0..limit {
                        if closure.contains(&(b, c)) {
                            next.insert((a, c));
                        }
                    }
                }
                if next.len() == closure.len() {
                    return closure;
                }
                closure = next;
            }
        }

        proptest! {
            #[test]
            fn asserted_facts_are_answered_exactly_once(
                edges in prop::collection::hash_set((0u8..6, 0u8..6), 1..20)
            ) {
                // asserting everything twice must not duplicate answers
                let src = format!(
                    "{p}{p} edge(X, Y)?",
                    p = edge_program(&edges)
                );
                let expected: HashSet<String> = edges
                    .iter()
                    .map(|(a, b)| format!("edge(n{a}, n{b})."))
                    .collect();
                prop_assert_eq!(answers(&src), expected);
            }

            #[test]
            fn closure_matches_reference_reachability(
                edges in prop::collection::hash_set((0u8..5, 0u8..5), 1..15)
            ) {
                let src = format!(
                    "{}path(X, Y) :- edge(X, Y).
                     path(X, Y) :- edge(X, Z), path(Z, Y).
                     path(X, Y)?",
                    edge_program(&edges)
                );
                let expected: HashSet<String> = reachable(&edges, 5)
                    .iter()
                    .map(|(a, b)| format!("path(n{a}, n{b})."))
                    .collect();
                prop_assert_eq!(answers(&src), expected);
            }
        }
    }
}
