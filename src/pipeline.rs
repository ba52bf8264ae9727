// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the DDX project (analytic derivatives for shading code).

//! Batch driver for whole translation units.
//!
//! [`convert_unit`] requests one derivative per (function, parameter) pair,
//! optionally simplifies each one, places the results according to
//! [`InputHandling`], and sweeps the generated functions with the verifier
//! before returning. The jobs share nothing mutable, so they may run on a
//! rayon pool; results are always placed in declaration order.

use tracing::{debug, info};

use crate::ast::{FunctionDecl, Item, TranslationUnit};
use crate::autodiff::{self, DeriveConfig, Derivative};
use crate::compose;
use crate::diagnostics;
use crate::opt;
use crate::parser;
use crate::scope::LexicalScope;
use crate::verify;

/// Where generated derivatives go relative to the input functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum InputHandling {
    /// Derivatives replace the functions they were built from.
    Omit,
    /// Every input item first, then every derivative.
    Prepend,
    /// Each function is immediately followed by its derivatives.
    #[default]
    Embed,
}

/// Options controlling the batch driver.
#[derive(Debug, Clone)]
pub struct DeriveOptions {
    pub input_handling: InputHandling,
    /// Run the simplifier over every generated function.
    pub simplify: bool,
    /// Fan jobs out over a rayon pool (needs the `parallel` feature).
    pub parallel: bool,
    /// Worker count for the pool; `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Recursion-depth guard handed to the derivative engine.
    pub max_depth: usize,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            input_handling: InputHandling::default(),
            simplify: true,
            parallel: false,
            threads: None,
            max_depth: autodiff::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Errors surfaced by the batch driver.
///
/// A derivative that cannot be built is not an error; it becomes a
/// placeholder comment. Only unparsable input and verifier findings abort.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Parsing failed with one or more diagnostics.
    #[error("parse error")]
    Parse(Vec<diagnostics::Diagnostic>),
    /// A generated function failed the structural sweep.
    #[error("derivative verification failed: {0}")]
    Verify(#[from] verify::VerifyError),
    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Counts reported for one converted unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub functions: usize,
    pub derivatives: usize,
    pub placeholders: usize,
}

/// Output of [`convert_unit`].
#[derive(Debug, Clone)]
pub struct Conversion {
    pub unit: TranslationUnit,
    /// One entry per (function, parameter), in declaration order.
    pub derivatives: Vec<Derivative>,
    pub stats: ConversionStats,
}

struct Job<'a> {
    function: usize,
    func: &'a FunctionDecl,
    target: &'a str,
}

/// Differentiate every function of `unit` with respect to each of its
/// parameters.
pub fn convert_unit(
    unit: &TranslationUnit,
    opts: &DeriveOptions,
) -> Result<Conversion, PipelineError> {
    let scope = LexicalScope::new(unit);
    let config = DeriveConfig {
        max_depth: opts.max_depth,
    };

    let jobs: Vec<Job<'_>> = unit
        .functions()
        .enumerate()
        .flat_map(|(function, func)| {
            func.params.iter().map(move |p| Job {
                function,
                func,
                target: p.name.as_str(),
            })
        })
        .collect();
    debug!(jobs = jobs.len(), parallel = opts.parallel, "derivative jobs queued");

    let run = |job: &Job<'_>| -> Derivative {
        let derived = autodiff::derive_function_with(job.func, job.target, &scope, &config);
        match derived {
            Derivative::Function(func) if opts.simplify => {
                Derivative::Function(opt::simplify_function(&func, &scope))
            }
            other => other,
        }
    };
    let derivatives: Vec<Derivative> = if opts.parallel {
        run_parallel(&jobs, &run, opts.threads)?
    } else {
        jobs.iter().map(run).collect()
    };

    let generated = derivatives.iter().filter_map(|d| match d {
        Derivative::Function(func) => Some(func),
        Derivative::Unavailable { .. } => None,
    });
    verify::verify_functions(generated, &scope)?;

    let mut per_function: Vec<Vec<Item>> = vec![Vec::new(); unit.functions().count()];
    for (job, derivative) in jobs.iter().zip(&derivatives) {
        per_function[job.function].push(derivative.clone().into_item());
    }
    let items = assemble(unit, per_function, opts.input_handling);

    let stats = ConversionStats {
        functions: unit.functions().count(),
        derivatives: derivatives.iter().filter(|d| d.is_available()).count(),
        placeholders: derivatives.iter().filter(|d| !d.is_available()).count(),
    };
    info!(
        functions = stats.functions,
        derivatives = stats.derivatives,
        placeholders = stats.placeholders,
        "translation unit converted"
    );

    Ok(Conversion {
        unit: TranslationUnit::new(items),
        derivatives,
        stats,
    })
}

fn assemble(
    unit: &TranslationUnit,
    per_function: Vec<Vec<Item>>,
    mode: InputHandling,
) -> Vec<Item> {
    let mut derived = per_function.into_iter();
    let mut items = Vec::with_capacity(unit.items.len());
    let mut appended = Vec::new();
    for item in &unit.items {
        let Item::Function(_) = item else {
            items.push(item.clone());
            continue;
        };
        let generated = derived.next().unwrap_or_default();
        match mode {
            InputHandling::Omit => items.extend(generated),
            InputHandling::Prepend => {
                items.push(item.clone());
                appended.extend(generated);
            }
            InputHandling::Embed => {
                items.push(item.clone());
                items.extend(generated);
            }
        }
    }
    items.extend(appended);
    items
}

#[cfg(feature = "parallel")]
fn run_parallel<F>(
    jobs: &[Job<'_>],
    run: &F,
    threads: Option<usize>,
) -> Result<Vec<Derivative>, PipelineError>
where
    F: Fn(&Job<'_>) -> Derivative + Sync,
{
    use rayon::prelude::*;

    let pool = build_thread_pool(threads)?;
    Ok(pool.install(|| jobs.par_iter().map(run).collect()))
}

#[cfg(not(feature = "parallel"))]
fn run_parallel<F>(
    jobs: &[Job<'_>],
    run: &F,
    _threads: Option<usize>,
) -> Result<Vec<Derivative>, PipelineError>
where
    F: Fn(&Job<'_>) -> Derivative + Sync,
{
    tracing::warn!("built without the `parallel` feature; running jobs sequentially");
    Ok(jobs.iter().map(run).collect())
}

#[cfg(feature = "parallel")]
fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, PipelineError> {
    if threads == Some(0) {
        return Err(PipelineError::ThreadPool(
            "thread count must be >= 1 when set".to_string(),
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))
}

/// Parse `source` and convert it.
pub fn convert_source(source: &str, opts: &DeriveOptions) -> Result<Conversion, PipelineError> {
    let unit = parser::parse_with_diagnostics(source).map_err(PipelineError::Parse)?;
    convert_unit(&unit, opts)
}

/// Parse, convert and compose in one step.
pub fn convert_text(source: &str, opts: &DeriveOptions) -> Result<String, PipelineError> {
    let converted = convert_source(source, opts)?;
    Ok(compose::compose(&converted.unit))
}
