//! Loss-function dispatch.
//!
//! An (instrument class, objective) pair resolves to a scoring function
//! through an explicit lookup table built at startup. Resolution order:
//! exact instrument entry, then the generic entry for the objective,
//! then a constant-NaN stub — a missing loss function degrades to a
//! neutral signal so the outer optimization loop keeps advancing.

use std::collections::HashMap;

use crate::domain::models::{RegionSet, Spectrum};

use super::analyzer::{SpectralRegionAnalyzer, Target};
use super::novelty::{score_spectra, TrainRegions};

const EPSILON: f64 = 1e-9;

/// Supported instrument classes. Anything outside the allowlist is
/// handled generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentClass {
    Nmr,
    Hplc,
    Raman,
    Generic,
}

impl InstrumentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nmr => "nmr",
            Self::Hplc => "hplc",
            Self::Raman => "raman",
            Self::Generic => "generic",
        }
    }
}

/// Classify a raw instrument string, stripping any simulation tag
/// first ("SimulatedSpinsolveNMRSpectrum", "spinsolve_sim", ...).
pub fn parse_instrument(raw: &str) -> InstrumentClass {
    let mut name = raw.to_lowercase();
    for tag in ["simulated", "simulation"] {
        name = name.replace(tag, "");
    }
    for suffix in ["_sim", "-sim"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }
    if name.contains("spinsolve") || name.contains("nmr") {
        InstrumentClass::Nmr
    } else if name.contains("hplc") || name.contains("agilent") {
        InstrumentClass::Hplc
    } else if name.contains("raman") || name.contains("ocean") {
        InstrumentClass::Raman
    } else {
        tracing::debug!(instrument = raw, "Instrument outside allowlist, using generic handling");
        InstrumentClass::Generic
    }
}

/// A parsed objective string, e.g. `negative_spectrum_peak_area_42`:
/// optional sign-flip prefix, the objective kind, and an optional
/// trailing numeric suffix naming the target position.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveSpec {
    pub kind: String,
    pub target: Option<f64>,
    pub negate: bool,
}

/// Parse an objective string. `neg` and `negative` prefixes are
/// synonyms for sign-flip.
pub fn parse_objective(raw: &str) -> ObjectiveSpec {
    let mut tokens: Vec<&str> = raw.split('_').filter(|t| !t.is_empty()).collect();
    let negate = matches!(tokens.first(), Some(&"neg") | Some(&"negative"));
    if negate {
        tokens.remove(0);
    }
    let parsed_suffix = tokens.last().and_then(|t| t.parse::<f64>().ok());
    let target = match parsed_suffix {
        Some(v) => {
            tokens.pop();
            Some(v)
        }
        None => None,
    };
    ObjectiveSpec {
        kind: tokens.join("_"),
        target,
        negate,
    }
}

/// Everything a loss function may need for one evaluation.
pub struct LossContext<'a> {
    pub spectrum: &'a Spectrum,
    pub regions: &'a RegionSet,
    /// Target position parsed from the objective suffix.
    pub target: Option<f64>,
    /// Explicit `[left, right]` window for integration objectives.
    pub window: Option<(f64, f64)>,
    /// Reference peak position for AUC normalization.
    pub reference: Option<f64>,
    /// Side-product windows; their summed AUC divides the value.
    pub constraints: &'a [(f64, f64)],
    /// History for novelty objectives.
    pub train: Option<&'a mut TrainRegions>,
}

type LossFn = fn(&mut LossContext) -> f64;

/// Where a lookup resolved, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exact(InstrumentClass),
    GenericFallback,
    Stub,
}

/// The startup-built (instrument, objective) → function table.
pub struct LossRegistry {
    table: HashMap<(InstrumentClass, &'static str), LossFn>,
}

impl Default for LossRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LossRegistry {
    pub fn new() -> Self {
        let mut table: HashMap<(InstrumentClass, &'static str), LossFn> = HashMap::new();
        table.insert((InstrumentClass::Nmr, "spectrum_peak_area"), nmr_peak_area as LossFn);
        table.insert((InstrumentClass::Hplc, "spectrum_peak_area"), hplc_peak_area as LossFn);
        table.insert((InstrumentClass::Raman, "spectrum_peak_area"), generic_peak_area as LossFn);
        table.insert(
            (InstrumentClass::Generic, "spectrum_peak_area"),
            generic_peak_area as LossFn,
        );
        table.insert(
            (InstrumentClass::Generic, "spectrum_integration_area"),
            integration_area as LossFn,
        );
        table.insert((InstrumentClass::Generic, "novelty"), novelty as LossFn);
        Self { table }
    }

    /// Resolve without evaluating. Exact instrument entry first, then
    /// the generic entry, then the stub.
    pub fn resolve(&self, instrument: InstrumentClass, kind: &str) -> (Resolution, LossFn) {
        if let Some(&f) = self.table.get(&(instrument, kind_key(kind))) {
            if instrument != InstrumentClass::Generic {
                return (Resolution::Exact(instrument), f);
            }
            return (Resolution::GenericFallback, f);
        }
        if let Some(&f) = self.table.get(&(InstrumentClass::Generic, kind_key(kind))) {
            return (Resolution::GenericFallback, f);
        }
        tracing::warn!(kind, "No loss function registered, degrading to neutral NaN");
        (Resolution::Stub, nan_stub)
    }

    /// Full evaluation path: parse, resolve, score, apply sign flip.
    pub fn evaluate(&self, instrument_raw: &str, objective_raw: &str, ctx: &mut LossContext) -> f64 {
        let instrument = parse_instrument(instrument_raw);
        let objective = parse_objective(objective_raw);
        if ctx.target.is_none() {
            ctx.target = objective.target;
        }
        let (resolution, f) = self.resolve(instrument, &objective.kind);
        tracing::debug!(
            instrument = instrument.as_str(),
            kind = %objective.kind,
            ?resolution,
            "Dispatching loss function"
        );
        let value = f(ctx);
        if objective.negate {
            -value
        } else {
            value
        }
    }
}

/// Interns the handful of known objective kinds so the table can key on
/// `&'static str`.
fn kind_key(kind: &str) -> &'static str {
    match kind {
        "spectrum_peak_area" => "spectrum_peak_area",
        "spectrum_integration_area" => "spectrum_integration_area",
        "novelty" => "novelty",
        _ => "",
    }
}

/// Divide the raw value by the reference AUC (when a reference peak is
/// given) and by the summed side-product AUCs (when constraints exist).
fn normalize(ctx: &LossContext, raw: f64) -> f64 {
    let mut value = raw;
    if let Some(reference) = ctx.reference {
        let analyzer = SpectralRegionAnalyzer::for_spectrum(ctx.spectrum);
        let reference_auc = analyzer.reference_area(ctx.spectrum, ctx.regions, reference);
        value /= reference_auc + EPSILON;
    }
    if !ctx.constraints.is_empty() {
        let suppressed: f64 = ctx
            .constraints
            .iter()
            .map(|&(l, r)| ctx.spectrum.integrate_window(l, r))
            .sum();
        value /= suppressed + EPSILON;
    }
    value
}

fn nmr_peak_area(ctx: &mut LossContext) -> f64 {
    let Some(target) = ctx.target else {
        tracing::warn!("nmr peak-area objective without a target position");
        return f64::NAN;
    };
    let analyzer = SpectralRegionAnalyzer::for_spectrum(ctx.spectrum);
    let raw = analyzer.target_area(ctx.spectrum, ctx.regions, Target::Peak(target));
    normalize(ctx, raw)
}

/// HPLC peaks are tracked by retention time; integrate a fixed window
/// around it.
const HPLC_WINDOW_HALF_WIDTH: f64 = 0.5;

fn hplc_peak_area(ctx: &mut LossContext) -> f64 {
    let Some(target) = ctx.target else {
        tracing::warn!("hplc peak-area objective without a retention time");
        return f64::NAN;
    };
    let raw = ctx
        .spectrum
        .integrate_window(target - HPLC_WINDOW_HALF_WIDTH, target + HPLC_WINDOW_HALF_WIDTH);
    normalize(ctx, raw)
}

const GENERIC_WINDOW_HALF_WIDTH: f64 = 1.0;

fn generic_peak_area(ctx: &mut LossContext) -> f64 {
    let Some(target) = ctx.target else {
        tracing::warn!("peak-area objective without a target position");
        return f64::NAN;
    };
    let raw = ctx
        .spectrum
        .integrate_window(target - GENERIC_WINDOW_HALF_WIDTH, target + GENERIC_WINDOW_HALF_WIDTH);
    normalize(ctx, raw)
}

fn integration_area(ctx: &mut LossContext) -> f64 {
    let Some((left, right)) = ctx.window else {
        tracing::warn!("integration-area objective without an explicit window");
        return f64::NAN;
    };
    let raw = ctx.spectrum.integrate_window(left, right);
    normalize(ctx, raw)
}

fn novelty(ctx: &mut LossContext) -> f64 {
    let Some(train) = ctx.train.as_deref_mut() else {
        tracing::warn!("novelty objective without a training history");
        return f64::NAN;
    };
    score_spectra(&[(ctx.spectrum, ctx.regions.clone())], train)[0]
}

fn nan_stub(_ctx: &mut LossContext) -> f64 {
    f64::NAN
}
