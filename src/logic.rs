//! Terms, literals, clauses, and the unification machinery they share.
//!
//! Everything here is immutable once built. Predicates are interned by the
//! database so that every literal naming `foo/2` holds the same descriptor.

use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;

/// A term is either a constant or a variable, both identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Variable(Box<str>),
    Constant(Box<str>),
}

impl Term {
    #[inline]
    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Variable(n) | Term::Constant(n) => n,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hook computing the facts of a primitive predicate at search time.
///
/// The argument is the subgoal literal being searched; returned literals are
/// adjoined to that subgoal as derived facts. A returned error aborts the
/// whole query.
pub type Primitive = Arc<dyn Fn(&Literal) -> Result<Vec<Literal>, Box<str>> + Send + Sync>;

/// A named relation of fixed arity, optionally backed by a primitive.
///
/// Identity is `name/arity`; the string is cached because it prefixes every
/// literal key.
pub struct Predicate {
    pub name: Box<str>,
    pub arity: u32,
    primitive: Option<Primitive>,
    id: Box<str>,
}

impl Predicate {
    pub fn new(name: &str, arity: u32) -> Self {
        Self {
            name: name.into(),
            arity,
            primitive: None,
            id: Self::identity(name, arity),
        }
    }

    pub fn with_primitive(name: &str, arity: u32, hook: Primitive) -> Self {
        Self {
            name: name.into(),
            arity,
            primitive: Some(hook),
            id: Self::identity(name, arity),
        }
    }

    pub fn identity(name: &str, arity: u32) -> Box<str> {
        format!("{name}/{arity}").into()
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        self.primitive.is_some()
    }

    pub fn primitive(&self) -> Option<&Primitive> {
        self.primitive.as_ref()
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Predicate {}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("id", &self.id)
            .field("primitive", &self.primitive.is_some())
            .finish()
    }
}

/// A predicate applied to exactly `arity` terms.
#[derive(Debug, Clone)]
pub struct Literal {
    pub pred: Arc<Predicate>,
    pub terms: Vec<Term>,
}

// Key fragments are length-prefixed so that adjacent names cannot run into
// each other ("ab","c" vs "a","bc").
fn push_len_prefixed(out: &mut String, part: &str) {
    out.push_str(&part.len().to_string());
    out.push_str(part);
}

impl Literal {
    pub fn new(pred: Arc<Predicate>, terms: Vec<Term>) -> Self {
        Self { pred, terms }
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_constant)
    }

    /// Ground identity: keys fact sets and contributes to clause identity.
    /// Terms carry a constant/variable marker so `p(x)` and `p(X)` differ.
    pub fn id(&self) -> Box<str> {
        let mut out = String::from(self.pred.id());
        for t in &self.terms {
            let tagged = match t {
                Term::Constant(v) => format!("c{v}"),
                Term::Variable(v) => format!("v{v}"),
            };
            push_len_prefixed(&mut out, &tagged);
        }
        out.into_boxed_str()
    }

    /// Variant tag: equal for two literals iff one is the other under a
    /// one-to-one renaming of variables. Constants compare by value,
    /// variables by the position of their first occurrence. Keys the
    /// subgoal table.
    pub fn tag(&self) -> Box<str> {
        let mut out = String::new();
        push_len_prefixed(&mut out, self.pred.id());
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        for (i, t) in self.terms.iter().enumerate() {
            let part = match t {
                Term::Constant(v) => format!("c{v}"),
                Term::Variable(v) => {
                    let ix = *first_seen.entry(v.as_ref()).or_insert(i);
                    format!("v{ix}")
                }
            };
            push_len_prefixed(&mut out, &part);
        }
        out.into_boxed_str()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.pred.name)?;
        if !self.terms.is_empty() {
            write!(f, "(")?;
            for (i, t) in self.terms.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{t}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Head plus ordered body. Empty body makes the clause a fact.
#[derive(Debug, Clone)]
pub struct Clause {
    pub head: Literal,
    pub body: Vec<Literal>,
}

impl Clause {
    pub fn fact(head: Literal) -> Self {
        Self { head, body: Vec::new() }
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Safe clauses have every head variable somewhere in the body. Safety
    /// is what bounds the search and guarantees termination.
    pub fn is_safe(&self) -> bool {
        self.head.terms.iter().all(|t| match t {
            Term::Constant(_) => true,
            v @ Term::Variable(_) => self.body.iter().any(|l| l.terms.contains(v)),
        })
    }

    /// Clause identity: length-prefixed member literal ids. Keys clause
    /// sets, making repeated assertion idempotent.
    pub fn id(&self) -> Box<str> {
        let mut out = String::new();
        push_len_prefixed(&mut out, &self.head.id());
        for l in &self.body {
            push_len_prefixed(&mut out, &l.id());
        }
        out.into_boxed_str()
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, l) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{l}")?;
            }
        }
        Ok(())
    }
}

// ================== substitution & unification ==================

/// A substitution, mapping variable names to terms. Empty is the identity.
pub type Env = HashMap<Box<str>, Term>;

/// Follow variable bindings until a constant or an unbound variable.
fn chase<'a>(mut t: &'a Term, env: &'a Env) -> &'a Term {
    while let Term::Variable(v) = t {
        match env.get(v.as_ref()) {
            Some(next) => t = next,
            None => break,
        }
    }
    t
}

// Two constants clash; a variable binds to the opposite term. For two
// variables the second operand's variable is bound to the first.
fn bind(a: &Term, b: &Term, env: &mut Env) -> bool {
    match (a, b) {
        (Term::Constant(_), Term::Constant(_)) => false,
        (Term::Variable(v), t @ Term::Constant(_)) => {
            env.insert(v.clone(), t.clone());
            true
        }
        (t, Term::Variable(v)) => {
            env.insert(v.clone(), t.clone());
            true
        }
    }
}

/// Most-general unifier of two literals, or `None` when they cannot be made
/// structurally equal. No occurs-check is needed in a function-free logic.
pub fn unify(a: &Literal, b: &Literal) -> Option<Env> {
    if a.pred != b.pred {
        return None;
    }
    let mut env = Env::new();
    for (x, y) in a.terms.iter().zip(b.terms.iter()) {
        let cx = chase(x, &env).clone();
        let cy = chase(y, &env).clone();
        if cx != cy && !bind(&cx, &cy, &mut env) {
            return None;
        }
    }
    Some(env)
}

fn substitute_term(t: &Term, env: &Env) -> Term {
    match t {
        Term::Constant(_) => t.clone(),
        Term::Variable(v) => env.get(v.as_ref()).cloned().unwrap_or_else(|| t.clone()),
    }
}

/// Replace every bound variable by its image; constants pass through.
pub fn substitute(l: &Literal, env: &Env) -> Literal {
    if env.is_empty() {
        return l.clone();
    }
    Literal {
        pred: l.pred.clone(),
        terms: l.terms.iter().map(|t| substitute_term(t, env)).collect(),
    }
}

/// Apply a substitution to the head and every body literal.
pub fn substitute_clause(c: &Clause, env: &Env) -> Clause {
    if env.is_empty() {
        return c.clone();
    }
    Clause {
        head: substitute(&c.head, env),
        body: c.body.iter().map(|l| substitute(l, env)).collect(),
    }
}

/// Fresh-variable source, scoped to a single query so that concurrent
/// queries never contend and replays stay deterministic.
#[derive(Default)]
pub struct FreshVars {
    next: u64,
}

impl FreshVars {
    pub fn new() -> Self {
        Self::default()
    }

    // The scanner only ever produces identifiers of letters, digits, '_'
    // and '-', so a '#' name can collide with nothing it read.
    fn fresh(&mut self) -> Term {
        let t = Term::Variable(format!("#{}", self.next).into());
        self.next += 1;
        t
    }

    fn shuffle(&mut self, l: &Literal, env: &mut Env) {
        for t in &l.terms {
            if let Term::Variable(v) = t {
                if !env.contains_key(v.as_ref()) {
                    env.insert(v.clone(), self.fresh());
                }
            }
        }
    }
}

/// Copy a literal with every variable replaced by a fresh one.
pub fn rename_literal(l: &Literal, fresh: &mut FreshVars) -> Literal {
    let mut env = Env::new();
    fresh.shuffle(l, &mut env);
    substitute(l, &env)
}

/// Rename a clause apart from everything else in the current query.
/// Shuffling the body covers the head, since asserted clauses are safe.
pub fn rename_clause(c: &Clause, fresh: &mut FreshVars) -> Clause {
    let mut env = Env::new();
    for l in &c.body {
        fresh.shuffle(l, &mut env);
    }
    if env.is_empty() {
        return c.clone();
    }
    substitute_clause(c, &env)
}
