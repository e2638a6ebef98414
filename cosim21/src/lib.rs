//!
//! # Cosim21 Cross-Simulator Trace Reconciliation
//!
//! Bridges two simulation domains for one hardware design: a fast in-process
//! reference simulation, and an external cycle-accurate simulator driven by
//! generated structural source and a textual configuration script.
//!
//! The crate's two halves are duals of one another:
//!
//! * [write] generates the boundary artifacts for a black-box component
//!   described by an [IpCore]: a VHDL wrapper casting between the caller's
//!   signed/unsigned words and the component's raw bit-vectors, uniquely
//!   numbered instantiation fragments for either target language, and the
//!   configuration-script fragment creating the component externally.
//! * [read] decodes the external tool's flat per-cycle signal dump back into
//!   typed per-argument traces - scalars, index-ordered lists, named-field
//!   structs, and framed packet streams - merged over the reference run's
//!   output and aligned to a common cycle window.
//!
//! The only schema tying the two sides together is the naming convention
//! carried in dump headers and generated-source annotations.
//!

// Re-export the shared utility crate
pub use cosim21utils as utils;

// Internal modules
pub mod annotations;
pub mod cosim;
pub mod data;
pub mod read;
pub mod write;

// Re-export the data model and primary entry points at crate level
pub use cosim::{
    cosimulate, CosimOptions, ExternalSimulator, ReferenceSimulator, SimulationInputs,
};
pub use data::*;
