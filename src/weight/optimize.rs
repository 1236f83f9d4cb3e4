//! Learning token weights by minimizing location error.
//!
//! Each mixture j gets a sparse feature vector `f_j`; its weight is
//! `s_j = logistic(f_j · w)` for a shared feature-weight vector `w`. The
//! objective over training messages i is
//!
//! ```text
//! Σ_i (Σ_j c_ij s_j) / (Σ_j s_j) + λ/2 ‖w‖²
//! ```
//!
//! where `c_ij` is mixture j's error on message i and j ranges over the
//! mixtures relevant to message i. The logistic removes the need for box
//! constraints, so plain L-BFGS does the minimizing.

use crate::error::{GeolocError, Result};
use crate::gmm::GeoGmm;
use crate::model::ModelParams;
use crate::optim::{ConvergenceStatus, Optimizer, LBFGS};
use crate::primitives::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Gradient and relative-decrease tolerance of the minimizer.
const TOL: f64 = 1e-4;
const MAX_ITER: usize = 15_000;
const HISTORY: usize = 10;

/// Settings of a [`WeightOptimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOptions {
    /// λ; 0 disables regularization.
    pub regularizer: f64,
    /// Give every mixture its own feature.
    pub identity_feature: bool,
    /// Add the shared quality features.
    pub misc_feature: bool,
    /// Feature to derive initial weights from; empty for random.
    pub init_by_feature: String,
    /// Floor of the returned weights.
    pub min_value: f64,
    /// Seed of the random initialization.
    pub seed: u64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            regularizer: 1.0,
            identity_feature: true,
            misc_feature: false,
            init_by_feature: String::new(),
            min_value: 1e-10,
            seed: 0,
        }
    }
}

impl OptimizerOptions {
    /// The `opt_*` parameters and seed.
    #[must_use]
    pub fn from_params(params: &ModelParams) -> Self {
        Self {
            regularizer: params.opt_reg,
            identity_feature: params.opt_feature_id,
            misc_feature: params.opt_feature_misc,
            init_by_feature: params.opt_init.clone(),
            seed: params.seed,
            ..Self::default()
        }
    }
}

/// How a run went.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerDiagnostics {
    /// Size of the feature alphabet.
    pub n_features: usize,
    /// Distinct mixtures weighted.
    pub n_gmms: usize,
    /// Training messages.
    pub n_messages: usize,
    /// Objective at the initial point.
    pub initial_objective: f64,
    /// Objective at the solution.
    pub final_objective: f64,
    /// Minimizer iterations.
    pub iterations: usize,
    /// Minimizer outcome; not converging is not an error.
    pub status: ConvergenceStatus,
    /// Objective evaluations.
    pub n_fun_calls: usize,
    /// Gradient evaluations.
    pub n_deriv_calls: usize,
    /// Evaluations answered from the cache.
    pub n_cache_hits: usize,
    /// Wall time of the minimization.
    pub elapsed: Duration,
}

/// Learned token weights with diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReport {
    /// Token → weight in `[min_value, 1)`.
    pub weights: BTreeMap<String, f64>,
    /// Run diagnostics.
    pub diagnostics: OptimizerDiagnostics,
}

/// Per-message sums at the last evaluated point.
#[derive(Debug, Default)]
struct Cache {
    x: Option<Vec<f64>>,
    scores: Vec<f64>,
    weight_sums: Vec<f64>,
    weight_error_sums: Vec<f64>,
    f_value: f64,
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn dot(fv: &[(usize, f64)], x: &[f64]) -> f64 {
    fv.iter().map(|&(i, v)| x[i] * v).sum()
}

fn the_token(g: &GeoGmm) -> &str {
    g.tokens().keys().next().map_or("", String::as_str)
}

/// Token-weight optimizer over a training set.
///
/// Objective and gradient share one evaluation per distinct point: the last
/// point is remembered and compared by value.
#[derive(Debug)]
pub struct WeightOptimizer {
    tokens: Vec<String>,
    identities: Vec<String>,
    init_features: Vec<Option<f64>>,
    alphabet: Vec<String>,
    feature_vectors: Vec<Vec<(usize, f64)>>,
    messages: Vec<Vec<(usize, f64)>>,
    options: OptimizerOptions,
    cache: RefCell<Cache>,
    n_fun_calls: Cell<usize>,
    n_deriv_calls: Cell<usize>,
    n_cache_hits: Cell<usize>,
}

impl WeightOptimizer {
    /// Sets up the problem: `gmms_list[i]` are the mixtures relevant to
    /// message i and `errors_list[i]` their errors on it.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::DimensionMismatch`] if the lists or any of
    /// their rows differ in length.
    pub fn new(
        gmms_list: &[Vec<&GeoGmm>],
        errors_list: &[Vec<f64>],
        options: OptimizerOptions,
    ) -> Result<Self> {
        if gmms_list.len() != errors_list.len() {
            return Err(GeolocError::dimension_mismatch(
                "messages",
                gmms_list.len(),
                errors_list.len(),
            ));
        }
        let mut seen = HashSet::new();
        let mut all: Vec<&GeoGmm> = gmms_list
            .iter()
            .flatten()
            .copied()
            .filter(|g| seen.insert(g.id()))
            .collect();
        all.sort_by(|a, b| a.tokens().keys().cmp(b.tokens().keys()));
        let index: HashMap<u64, usize> = all.iter().enumerate().map(|(i, g)| (g.id(), i)).collect();

        let mut alphabet: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut feature_vectors = Vec::with_capacity(all.len());
        for g in &all {
            let fv = g
                .features(options.identity_feature, options.misc_feature)
                .iter()
                .map(|(name, v)| {
                    let i = *positions.entry(name.to_string()).or_insert_with(|| {
                        alphabet.push(name.to_string());
                        alphabet.len() - 1
                    });
                    (i, v)
                })
                .collect();
            feature_vectors.push(fv);
        }

        let mut messages = Vec::with_capacity(gmms_list.len());
        for (gmms, errors) in gmms_list.iter().zip(errors_list) {
            if gmms.len() != errors.len() {
                return Err(GeolocError::dimension_mismatch("errors", gmms.len(), errors.len()));
            }
            messages.push(
                gmms.iter()
                    .zip(errors)
                    .map(|(g, &e)| (index[&g.id()], e))
                    .collect(),
            );
        }

        let init_features = if options.init_by_feature.is_empty() {
            vec![None; all.len()]
        } else {
            all.iter()
                .map(|g| g.features(false, true).get(&options.init_by_feature))
                .collect()
        };
        Ok(Self {
            tokens: all.iter().map(|g| the_token(g).to_string()).collect(),
            identities: all.iter().map(|g| g.identity_feature()).collect(),
            init_features,
            alphabet,
            feature_vectors,
            messages,
            options,
            cache: RefCell::new(Cache::default()),
            n_fun_calls: Cell::new(0),
            n_deriv_calls: Cell::new(0),
            n_cache_hits: Cell::new(0),
        })
    }

    /// Size of the feature alphabet, i.e. the dimension of `w`.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.alphabet.len()
    }

    /// Feature names in alphabet order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.alphabet
    }

    /// Tokens of the distinct mixtures, sorted.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    fn update_cache(&self, x: &Vector<f64>) {
        let x = x.as_slice();
        let mut cache = self.cache.borrow_mut();
        if cache.x.as_deref() == Some(x) {
            self.n_cache_hits.set(self.n_cache_hits.get() + 1);
            return;
        }
        cache.scores = self.feature_vectors.iter().map(|fv| logistic(dot(fv, x))).collect();
        let mut f = 0.0;
        let mut weight_sums = Vec::with_capacity(self.messages.len());
        let mut weight_error_sums = Vec::with_capacity(self.messages.len());
        for msg in &self.messages {
            let (mut ws, mut wes) = (0.0, 0.0);
            for &(j, err) in msg {
                ws += cache.scores[j];
                wes += cache.scores[j] * err;
            }
            if ws != 0.0 {
                f += wes / ws;
            }
            weight_sums.push(ws);
            weight_error_sums.push(wes);
        }
        f += self.options.regularizer * x.iter().map(|v| v * v).sum::<f64>() / 2.0;
        cache.weight_sums = weight_sums;
        cache.weight_error_sums = weight_error_sums;
        cache.f_value = f;
        cache.x = Some(x.to_vec());
    }

    /// Objective at `x`.
    #[must_use]
    pub fn objective(&self, x: &Vector<f64>) -> f64 {
        self.n_fun_calls.set(self.n_fun_calls.get() + 1);
        self.update_cache(x);
        self.cache.borrow().f_value
    }

    /// Analytic gradient of the objective at `x`.
    #[must_use]
    pub fn gradient(&self, x: &Vector<f64>) -> Vector<f64> {
        self.n_deriv_calls.set(self.n_deriv_calls.get() + 1);
        self.update_cache(x);
        let cache = self.cache.borrow();
        let mut deriv = vec![0.0; self.alphabet.len()];
        for (i, msg) in self.messages.iter().enumerate() {
            let ws = cache.weight_sums[i];
            let wes = cache.weight_error_sums[i];
            for &(j, err) in msg {
                let s = cache.scores[j];
                let part = if ws * ws == 0.0 {
                    0.0
                } else {
                    s * (1.0 - s) * (err * ws - wes) / (ws * ws)
                };
                for &(fi, fv) in &self.feature_vectors[j] {
                    deriv[fi] += part * fv;
                }
            }
        }
        for (d, xi) in deriv.iter_mut().zip(x.as_slice()) {
            *d += self.options.regularizer * xi;
        }
        Vector::from_vec(deriv)
    }

    /// Starting point: uniform in `[-0.5, 0.5)`, or, with `init_by_feature`,
    /// ones with each identity feature set to `1/(1+f) - 0.5`.
    #[must_use]
    pub fn initial_point(&self) -> Vector<f64> {
        if self.options.init_by_feature.is_empty() {
            let mut rng = StdRng::seed_from_u64(self.options.seed);
            return Vector::from_vec(
                (0..self.alphabet.len()).map(|_| rng.gen_range(-0.5..0.5)).collect(),
            );
        }
        let mut x = vec![1.0; self.alphabet.len()];
        for (identity, f) in self.identities.iter().zip(&self.init_features) {
            if let (Some(i), Some(f)) = (self.alphabet.iter().position(|a| a == identity), f) {
                x[i] = 1.0 / (1.0 + f) - 0.5;
            }
        }
        Vector::from_vec(x)
    }

    /// Runs the minimization and returns token weights, each floored at
    /// `min_value`.
    ///
    /// # Errors
    ///
    /// Returns [`GeolocError::EmptyInput`] if there is nothing to weight.
    pub fn optimize(&self) -> Result<WeightReport> {
        if self.alphabet.is_empty() {
            return Err(GeolocError::empty_input("optimizer features"));
        }
        let x0 = self.initial_point();
        debug!(n_features = self.alphabet.len(), "minimizing token-weight objective");
        let initial_objective = self.objective(&x0);
        debug!(initial_objective, "initial function value");
        let start = Instant::now();
        let mut lbfgs = LBFGS::new(MAX_ITER, TOL, HISTORY).with_ftol(TOL);
        let res = lbfgs.minimize(|x| self.objective(x), |x| self.gradient(x), x0);
        let elapsed = start.elapsed();
        let final_objective = self.objective(&res.solution);
        debug!(
            ?elapsed,
            status = ?res.status,
            iterations = res.iterations,
            n_fun_calls = self.n_fun_calls.get(),
            n_deriv_calls = self.n_deriv_calls.get(),
            n_cache_hits = self.n_cache_hits.get(),
            final_objective,
            "minimized token-weight objective"
        );
        let x = res.solution.as_slice();
        let weights = self
            .tokens
            .iter()
            .zip(&self.feature_vectors)
            .map(|(t, fv)| (t.clone(), logistic(dot(fv, x)).max(self.options.min_value)))
            .collect();
        Ok(WeightReport {
            weights,
            diagnostics: OptimizerDiagnostics {
                n_features: self.alphabet.len(),
                n_gmms: self.tokens.len(),
                n_messages: self.messages.len(),
                initial_objective,
                final_objective,
                iterations: res.iterations,
                status: res.status,
                n_fun_calls: self.n_fun_calls.get(),
                n_deriv_calls: self.n_deriv_calls.get(),
                n_cache_hits: self.n_cache_hits.get(),
                elapsed,
            },
        })
    }
}
