//! NetworkFilesystem operator: controller wiring and CRD installation

#![deny(missing_docs)]

pub mod controller_runner;
pub mod crds;
