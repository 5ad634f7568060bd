//! Spectral analysis: converts raw instrument output into the scalar
//! objective values the optimization loop consumes.

pub mod analyzer;
pub mod loss;
pub mod novelty;
pub mod regions;

pub use analyzer::{SpectralRegionAnalyzer, Target};
pub use loss::{
    parse_instrument, parse_objective, InstrumentClass, LossContext, LossRegistry, ObjectiveSpec,
    Resolution,
};
pub use novelty::{
    expand_regions, information_score, novelty_coefficient, score_spectra, TrainRegions,
};
pub use regions::{
    find_closest_region, find_point_in_regions, find_regions, resolve_point_between_regions,
    PickingMode, PickingParams, ResolveMethod, ValueRegion,
};
