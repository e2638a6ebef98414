//!
//! # Cosimulation Orchestration Module
//!
//! Sequences one cosimulation end to end: reference run, artifact
//! generation, external-tool invocation, decode, and alignment. The two
//! simulators themselves are external collaborators behind the
//! [ReferenceSimulator] and [ExternalSimulator] traits; process mechanics,
//! file staging, and tool selection all live on their side of the seam.
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io Imports
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Local imports
use super::data::*;
use super::read;
use super::write;

/// Default clock period, in nanoseconds
pub const DEFAULT_PERIOD: u64 = 10;

fn default_period() -> u64 {
    DEFAULT_PERIOD
}

/// # Cosimulation Options
///
/// Pass-through run options. Loadable from JSON/YAML/TOML via
/// [crate::utils::SerdeFile]; which file gets loaded is the caller's
/// packaging concern.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CosimOptions {
    /// Clock period in nanoseconds
    #[serde(default = "default_period")]
    pub period: u64,
    /// Target device part, forwarded to the external tool
    #[serde(default)]
    pub part: Option<String>,
    /// Waveform capture name; `Some` requests a capture from the external run
    #[serde(default)]
    pub vcd_name: Option<String>,
    /// Target structural language
    pub language: HdlLanguage,
    /// Packet side-file column layout
    #[serde(default)]
    pub packet_columns: PacketColumns,
}
impl Default for CosimOptions {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            part: None,
            vcd_name: None,
            language: HdlLanguage::Vhdl,
            packet_columns: PacketColumns::default(),
        }
    }
}
impl crate::utils::SerdeFile for CosimOptions {}

/// # External Simulation Inputs
///
/// Everything the external collaborator needs to stage and run one capture:
/// the run length (reference cycles plus propagation), generated wrapper
/// files, the component configuration script, and forwarded options.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SimulationInputs {
    /// Cycles the external tool must simulate
    pub cycles: usize,
    /// Simulation runtime in nanoseconds
    pub runtime_ns: u64,
    /// Target structural language
    #[serde(default)]
    pub language: Option<HdlLanguage>,
    /// Target device part
    #[serde(default)]
    pub part: Option<String>,
    /// Requested waveform capture name
    #[serde(default)]
    pub vcd_name: Option<String>,
    /// Generated boundary-wrapper files, `(file name, content)`
    #[serde(default)]
    pub wrappers: Vec<(String, String)>,
    /// Concatenated component creation/configuration script fragments
    #[serde(default)]
    pub ip_config_tcl: String,
}

/// # Reference Simulator Seam
///
/// The in-process behavioral simulation. Runs the design for `cycles` and
/// returns its recorded per-argument output traces - the skeleton every
/// external capture is merged over.
pub trait ReferenceSimulator {
    fn simulate(&mut self, cycles: usize) -> CosimResult<TraceMap>;
}

/// # External Simulator Seam
///
/// The external, cycle-accurate tool. Receives the staged [SimulationInputs]
/// and returns the raw [Capture] of its run. Structural-source translation,
/// process invocation, and timeouts are entirely its business.
pub trait ExternalSimulator {
    fn simulate(&mut self, inputs: &SimulationInputs) -> CosimResult<Capture>;
}

/// Run one full cosimulation: reference simulation, artifact generation for
/// every wrapped component in `cores`, external invocation, decode, and
/// alignment into a [TraceBundle].
///
/// Each stage fully consumes its predecessor's output before the next
/// starts; the whole pipeline is synchronous.
pub fn cosimulate(
    cycles: usize,
    reference: &mut impl ReferenceSimulator,
    external: &mut impl ExternalSimulator,
    cores: &[IpCore],
    arg_kinds: &BTreeMap<String, ArgKind>,
    options: &CosimOptions,
) -> CosimResult<TraceBundle> {
    let ref_outputs = reference.simulate(cycles)?;
    let recorded = recorded_length(&ref_outputs)?;

    // One IpCore may back several instances; stage each wrapper and
    // configuration fragment once per module
    let mut seen: Vec<String> = Vec::new();
    let mut wrappers = Vec::new();
    let mut ip_config_tcl = String::new();
    for core in cores.iter() {
        let module = core.module_name();
        if seen.contains(&module) {
            continue;
        }
        seen.push(module);
        if options.language == HdlLanguage::Vhdl {
            wrappers.push((
                format!("{}.vhd", core.entity_name),
                write::wrapper_to_string(core)?,
            ));
        }
        ip_config_tcl.push_str(&write::tcl_fragment(core));
    }

    // The external run needs the propagation allowance on top of the
    // reference window
    let ext_cycles = recorded + PROPAGATION_OFFSET;
    let inputs = SimulationInputs {
        cycles: ext_cycles,
        runtime_ns: options.period * ext_cycles as u64,
        language: Some(options.language),
        part: options.part.clone(),
        vcd_name: options.vcd_name.clone(),
        wrappers,
        ip_config_tcl,
    };
    log::debug!(
        "external run: {} cycles ({} ns), {} wrapper file(s)",
        inputs.cycles,
        inputs.runtime_ns,
        inputs.wrappers.len()
    );
    let capture = external.simulate(&inputs)?;

    read::decode(&capture, arg_kinds, &ref_outputs, &options.packet_columns)
}

/// The common recorded length of the reference run's outputs.
/// Differing per-argument lengths mean the reference harness misbehaved.
fn recorded_length(outputs: &TraceMap) -> CosimResult<usize> {
    let mut length = None;
    for (name, trace) in outputs.iter() {
        match length {
            None => length = Some(trace.len()),
            Some(len) if len == trace.len() => (),
            Some(len) => {
                return Err(CosimError::Str(format!(
                    "Reference output {} recorded {} cycles where others recorded {}",
                    name,
                    trace.len(),
                    len
                )))
            }
        }
    }
    Ok(length.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::SerializationFormat::Toml;

    #[test]
    fn it_loads_options() {
        let src = r#"
            period = 20
            part = "xc7z020clg484-1"
            language = "Vhdl"
        "#;
        let options: CosimOptions = Toml.from_str(src).unwrap();
        assert_eq!(options.period, 20);
        assert_eq!(options.part.as_deref(), Some("xc7z020clg484-1"));
        assert_eq!(options.language, HdlLanguage::Vhdl);
        // Defaults fill the unnamed fields
        assert_eq!(options.vcd_name, None);
        assert_eq!(options.packet_columns, PacketColumns::default());
    }

    #[test]
    fn it_checks_reference_lengths() {
        use TraceValue::Bool;
        let mut outputs = TraceMap::new();
        outputs.insert("a".to_string(), SignalTrace::Scalar(vec![Bool(true); 4]));
        outputs.insert("b".to_string(), SignalTrace::Scalar(vec![Bool(true); 4]));
        assert_eq!(recorded_length(&outputs).unwrap(), 4);

        outputs.insert("c".to_string(), SignalTrace::Scalar(vec![Bool(true); 5]));
        assert!(recorded_length(&outputs).is_err());
    }
}
