//! Integration tests for simkern
//!
//! These tests drive whole simulations through the public API: platform
//! loading, resource sharing, failure injection, model selection and
//! reproducibility. They check what an application built on the kernel
//! observes, not the internals of any one module.

#[path = "style.rs"]
mod style;

#[path = "integration/bottleneck_sharing.rs"]
mod bottleneck_sharing;
#[path = "integration/config_and_version.rs"]
mod config_and_version;
#[path = "integration/determinism.rs"]
mod determinism;
#[path = "integration/failure_injection.rs"]
mod failure_injection;
#[path = "integration/model_selection.rs"]
mod model_selection;
