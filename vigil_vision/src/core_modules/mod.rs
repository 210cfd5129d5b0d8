// Leaf-first: each stage only depends on the ones above it.
pub mod geometry;
pub mod frame;
pub mod region_mask;
pub mod preprocessor;
pub mod zone;
pub mod change_estimator;
pub mod static_reference;
pub mod background_model;
pub mod segmenter;
pub mod region_extractor;
pub mod candidate_filter;
pub mod report;
