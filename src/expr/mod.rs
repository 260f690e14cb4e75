//! Field Transformation Expressions
//!
//! A narrow, side-effect-free language for computing one output value from a
//! single input record:
//!
//! - `user.address.city`: dotted field reference; missing keys resolve to `null`
//! - `'text'` / `"text"`: string literals
//! - `split(name, " ")[0]`: calls into the closed [`Builtin`] set, with indexing
//!
//! Evaluation only reads the supplied record and the literal text of the
//! expression. Results are deterministic, so [`Evaluator`] may memoize them.

pub mod functions;
pub mod parser;

pub use functions::{Arity, Builtin};
pub use parser::Expr;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::trace;

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};

/// A data record: one JSON object
pub type Record = serde_json::Map<String, Value>;

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    ast: Expr,
}

impl Expression {
    /// Parse expression text
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            ast: parser::parse(source)?,
        })
    }

    /// Path of a bare field reference
    pub fn field_path(&self) -> Option<&[String]> {
        self.ast.field_path()
    }

    /// Check function names and argument counts without a record
    pub fn check(&self) -> Result<()> {
        self.ast.visit_calls(&mut |name, arity| Builtin::lookup(name)?.check_arity(arity))
    }

    /// Evaluate against a record
    pub fn evaluate(&self, record: &Record) -> Result<Value> {
        eval(&self.ast, record)
    }
}

fn eval(expr: &Expr, record: &Record) -> Result<Value> {
    match expr {
        Expr::Field(path) => Ok(resolve_path(record, path)),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Index { target, index } => {
            let base = eval(target, record)?;
            Ok(usize::try_from(*index)
                .ok()
                .and_then(|i| base.as_array().and_then(|items| items.get(i)))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Expr::Call { function, args } => {
            let builtin = Builtin::lookup(function)?;
            builtin.check_arity(args.len())?;
            let values = args
                .iter()
                .map(|arg| eval(arg, record))
                .collect::<Result<Vec<_>>>()?;
            builtin.call(&values)
        }
    }
}

/// Resolve a dotted path by sequential key lookup.
///
/// Missing keys and non-object intermediates yield `null`.
pub fn resolve_path(record: &Record, path: &[String]) -> Value {
    let Some((first, rest)) = path.split_first() else {
        return Value::Null;
    };

    let mut current = match record.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for segment in rest {
        match current.get(segment.as_str()) {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Evaluates expression text, optionally memoizing parses and results.
///
/// The cache is shared behind `RwLock`s, so one evaluator can serve many threads.
#[derive(Debug, Default)]
pub struct Evaluator {
    cache: Option<EvaluationCache>,
}

#[derive(Debug, Default)]
struct EvaluationCache {
    capacity: usize,
    programs: RwLock<HashMap<String, Arc<Expression>>>,
    results: RwLock<HashMap<(Checksum, String), Value>>,
}

impl Evaluator {
    /// Evaluator without caching
    pub fn new() -> Self {
        Self { cache: None }
    }

    /// Evaluator that keeps up to `capacity` parsed programs and results
    pub fn cached(capacity: usize) -> Self {
        Self {
            cache: Some(EvaluationCache {
                capacity: capacity.max(1),
                ..Default::default()
            }),
        }
    }

    /// Evaluate expression text against a record
    pub fn evaluate(&self, source: &str, record: &Record) -> Result<Value> {
        let digest = self.digest(record)?;
        self.evaluate_digested(source, record, digest.as_ref())
    }

    /// Cache key for a record; `None` when caching is off
    pub(crate) fn digest(&self, record: &Record) -> Result<Option<Checksum>> {
        match self.cache {
            Some(_) => Checksum::of(record).map(Some),
            None => Ok(None),
        }
    }

    /// Evaluate with a digest computed once by the caller for `record`
    pub(crate) fn evaluate_digested(
        &self,
        source: &str,
        record: &Record,
        digest: Option<&Checksum>,
    ) -> Result<Value> {
        let (Some(cache), Some(digest)) = (&self.cache, digest) else {
            return Expression::parse(source)?.evaluate(record);
        };

        let key = (digest.clone(), source.to_string());
        if let Some(hit) = cache.results.read().map_err(lock_error)?.get(&key) {
            trace!(expression = source, "evaluation cache hit");
            return Ok(hit.clone());
        }

        let program = cache.program(source)?;
        let value = program.evaluate(record)?;

        let mut results = cache.results.write().map_err(lock_error)?;
        if results.len() >= cache.capacity {
            results.clear();
        }
        results.insert(key, value.clone());
        Ok(value)
    }

    /// Number of memoized results
    pub fn cached_results(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|cache| cache.results.read().ok().map(|r| r.len()))
            .unwrap_or(0)
    }

    /// Drop all memoized programs and results
    pub fn clear_cache(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.programs.write().map_err(lock_error)?.clear();
            cache.results.write().map_err(lock_error)?.clear();
        }
        Ok(())
    }
}

impl EvaluationCache {
    fn program(&self, source: &str) -> Result<Arc<Expression>> {
        if let Some(program) = self.programs.read().map_err(lock_error)?.get(source) {
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(Expression::parse(source)?);
        let mut programs = self.programs.write().map_err(lock_error)?;
        if programs.len() >= self.capacity {
            programs.clear();
        }
        programs.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }
}

fn lock_error<T>(err: std::sync::PoisonError<T>) -> SchemaError {
    SchemaError::LockPoisoned(err.to_string())
}
