//!
//! # Cosim Data Model
//!
//! Describes black-box hardware components at their simulation boundary,
//! and the typed per-port traces reconstructed from an external simulator's
//! recorded output.
//!

// Std-Lib
use std::collections::BTreeMap;

// Crates.io Imports
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Cosim21 Imports
use crate::utils::{enumstr, EnumStr};

/// Marker token identifying name-annotation comment lines in generated source.
/// Lines of the form `<comment_prefix> <marker> <internal> <external>` map
/// internal wrapper signal names back to the caller's port names.
pub const NAME_ANNOTATION: &str = "<name_annotation>";

/// Fixed marker prefixed (with an underscore) onto every boundary signal the
/// wrapper emits. `wrapped_<port>` uniquely associates each raw-vector signal
/// and cast line with its originating port.
pub const WRAPPED_MARKER: &str = "wrapped";

/// Cycles of propagation latency the external simulator incurs between
/// reading and writing, relative to the reference run.
/// Treated as universal across component classes; so far nothing has
/// demonstrated a width- or configuration-dependent value.
pub const PROPAGATION_OFFSET: usize = 1;

// Static default for the packet side-file column layout.
// Note [`once_cell`](https://docs.rs/once_cell/1.8.0/once_cell/#lazy-initialized-global-data)
// demands these be `static`, not `const`, for reasons outside our grasp.
pub static DEFAULT_PACKET_COLUMNS: Lazy<PacketColumns> = Lazy::new(|| PacketColumns {
    payload: "TDATA".to_string(),
    last: "TLAST".to_string(),
});

enumstr!(
    /// # Container Kinds
    ///
    /// First token of every dump-column header: how a column participates in
    /// a top-level argument. `plain` columns stand alone; `list` columns are
    /// indexed elements of one ordered argument; `interface` columns are
    /// named fields of one grouped argument.
    ///
    /// Packet streams have no container token of their own: their payload and
    /// frame-flag are recorded as two ordinary `plain` columns, identified as
    /// one logical argument by the caller's argument-type table.
    ContainerKind {
        Plain: "plain",
        List: "list",
        Interface: "interface",
    }
);

enumstr!(
    /// # Signal Value Kinds
    ///
    /// Second token of every dump-column header: how the column's fixed-width
    /// bit-pattern cells are reinterpreted.
    SignalKind {
        Bool: "bool",
        Signed: "signed",
        Unsigned: "unsigned",
    }
);

enumstr!(
    /// # Target Structural Languages
    HdlLanguage {
        Vhdl: "VHDL",
        Verilog: "Verilog",
    }
);
impl HdlLanguage {
    /// The single-line comment prefix, as matched by the annotation resolver.
    pub fn comment_prefix(&self) -> &'static str {
        match self {
            Self::Vhdl => "--",
            Self::Verilog => "//",
        }
    }
}

enumstr!(
    /// # Configuration-Script Keys
    ///
    /// Enumerated keywords of the external tool's configuration script,
    /// used when generating component creation/configuration fragments.
    TclKey {
        CreateIp: "create_ip",
        SetProperty: "set_property",
        GenerateTarget: "generate_target",
        GetIps: "get_ips",
        Name: "-name",
        Vendor: "-vendor",
        Library: "-library",
        Version: "-version",
        ModuleName: "-module_name",
        Dict: "-dict",
        List: "list",
        All: "all",
    }
);

/// # Port Value Kind
///
/// The semantic type of one boundary port: a single-bit flag, or a
/// bit-accurate signed or unsigned word of the given width.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PortKind {
    Bool,
    Signed(u32),
    Unsigned(u32),
}
impl PortKind {
    /// Bit width of the boundary signal this kind occupies
    pub fn width(&self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Signed(w) | Self::Unsigned(w) => *w,
        }
    }
    /// The width-less value-kind token used in dump headers
    pub fn signal_kind(&self) -> SignalKind {
        match self {
            Self::Bool => SignalKind::Bool,
            Self::Signed(_) => SignalKind::Signed,
            Self::Unsigned(_) => SignalKind::Unsigned,
        }
    }
}

/// # Port Direction
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}
impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Output => "output",
        };
        write!(f, "{}", s)
    }
}

/// # Port Descriptor
///
/// One port on the simulation boundary of a wrapped component:
/// the caller-side name, value kind, direction, and the name the external
/// component itself uses (`ip_name`).
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Port {
    /// Caller-side port name
    pub name: String,
    /// Value kind, including bit width
    pub kind: PortKind,
    /// Direction, relative to the wrapped component
    pub direction: PortDirection,
    /// Corresponding port name on the external component
    pub ip_name: String,
}
impl Port {
    /// Shorthand constructor
    pub fn new(
        name: impl Into<String>,
        kind: PortKind,
        direction: PortDirection,
        ip_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            direction,
            ip_name: ip_name.into(),
        }
    }
}

/// # Component Descriptor
///
/// Describes one logical configuration of an externally supplied component:
/// its identity in the external tool's catalog, its ordered boundary ports,
/// and an opaque set of build-time configuration options passed through
/// verbatim. Immutable after construction, except for the instance counter
/// consumed by [IpCore::create_instance].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct IpCore {
    /// Name of the generated wrapper entity
    pub entity_name: String,
    /// Name of the wrapped component in the external catalog
    pub ip_name: String,
    /// Catalog vendor, e.g. `xilinx.com`
    pub vendor: String,
    /// Catalog library name
    pub library: String,
    /// Catalog version string, e.g. `"2.1"`
    pub version: String,
    /// Boundary ports, in caller-declared order
    pub ports: Vec<Port>,
    /// Build-time configuration options, applied verbatim.
    /// Option semantics are the external tool's business; only shape is kept.
    #[serde(default)]
    pub config: Vec<(String, String)>,
    /// Count of instances created so far.
    /// Also the next instance number to be consumed; never decremented.
    #[serde(default)]
    instances: usize,
}
impl IpCore {
    /// Create a new [IpCore], validating its boundary description.
    /// Fails with [CosimError::Config] on a zero-width port or a duplicated
    /// external port name.
    pub fn new(
        entity_name: impl Into<String>,
        ip_name: impl Into<String>,
        vendor: impl Into<String>,
        library: impl Into<String>,
        version: impl Into<String>,
        ports: Vec<Port>,
        config: Vec<(String, String)>,
    ) -> CosimResult<Self> {
        for port in ports.iter() {
            if port.kind.width() < 1 {
                return Err(CosimError::Config(format!(
                    "Port {} has zero width",
                    port.name
                )));
            }
        }
        for (num, port) in ports.iter().enumerate() {
            if ports[..num].iter().any(|p| p.ip_name == port.ip_name) {
                return Err(CosimError::Config(format!(
                    "External port name {} is not unique",
                    port.ip_name
                )));
            }
        }
        Ok(Self {
            entity_name: entity_name.into(),
            ip_name: ip_name.into(),
            vendor: vendor.into(),
            library: library.into(),
            version: version.into(),
            ports,
            config,
            instances: 0,
        })
    }
    /// Name of the external-tool module: the catalog name and the wrapper
    /// entity name, underscore-joined.
    pub fn module_name(&self) -> String {
        format!("{}_{}", self.ip_name, self.entity_name)
    }
    /// Look up a port by caller-side name
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
    /// Number of instances created so far
    pub fn instances_created(&self) -> usize {
        self.instances
    }
    /// Derive a fresh, uniquely numbered [Instance] and its generated
    /// artifacts. Each call consumes one instance number, shared across both
    /// target languages and never reused.
    ///
    /// `overrides` maps caller-side port names to the signal names to be
    /// placed in the instantiation fragment instead; each overridden name
    /// must refer to a declared port, else [CosimError::UnknownPort] and no
    /// artifact is produced.
    pub fn create_instance(
        &mut self,
        lang: HdlLanguage,
        overrides: &[(&str, &str)],
    ) -> CosimResult<Instance> {
        for (name, _) in overrides.iter() {
            if self.port(name).is_none() {
                return Err(CosimError::UnknownPort {
                    component: self.entity_name.clone(),
                    port: name.to_string(),
                });
            }
        }
        let index = self.instances;
        let name = format!("{}_{}", self.entity_name, index);
        let instantiation = crate::write::instantiation(self, &name, lang, overrides);
        let wrapper = match lang {
            // VHDL instantiates the wrapper entity; the wrapper body adapts types
            HdlLanguage::Vhdl => Some(crate::write::wrapper_to_string(self)?),
            // Verilog instantiation is self-contained, no wrapper required
            HdlLanguage::Verilog => None,
        };
        let tcl = crate::write::tcl_fragment(self);
        self.instances += 1;
        Ok(Instance {
            name,
            index,
            instantiation,
            wrapper,
            tcl,
        })
    }
}

/// # Instance Artifacts
///
/// Everything generated for one numbered instantiation of an [IpCore]:
/// the deferred-substitution instantiation fragment, the (VHDL-only)
/// boundary wrapper body, and the configuration-script fragment.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Instance {
    /// Generated instance name, `<entity_name>_<index>`
    pub name: String,
    /// Instance number, unique per [IpCore]
    pub index: usize,
    /// Instantiation fragment, with `${...}` placeholders for signal names
    pub instantiation: String,
    /// Boundary wrapper body. `Some` for VHDL, `None` for Verilog.
    pub wrapper: Option<String>,
    /// Configuration-script fragment creating and configuring the component
    pub tcl: String,
}

/// # Trace Cell Value
///
/// One recorded per-cycle value. `Undefined` marks a value the external
/// simulator could not resolve (e.g. before initialization); it is a legal
/// cell value, propagated as-is and never coerced to zero or false.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TraceValue {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Undefined,
}
impl TraceValue {
    /// Boolean indication of the `Undefined` marker
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// # Signal Trace
///
/// The ordered per-cycle record of one top-level argument, in one of the
/// four mutually exclusive container shapes. Decoded by exhaustive matching
/// on the dump header's container-kind token.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SignalTrace {
    /// A single signal's per-cycle values
    Scalar(Vec<TraceValue>),
    /// An index-ordered signal list; outer = cycle, inner = index
    List(Vec<Vec<TraceValue>>),
    /// A named-field signal group
    Struct(StructTrace),
    /// A framed packet stream
    PacketStream(PacketTrace),
}
impl SignalTrace {
    /// Number of recorded cycles
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(vals) => vals.len(),
            Self::List(cycles) => cycles.len(),
            Self::Struct(s) => s.cycles.len(),
            Self::PacketStream(p) => p.signals.len(),
        }
    }
    /// Boolean indication of an empty (zero-cycle) trace
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Discard recorded cycles beyond the first `len`.
    /// Reassembled packets are frame-oriented, not cycle-indexed, and are
    /// left untouched.
    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            Self::Scalar(vals) => vals.truncate(len),
            Self::List(cycles) => cycles.truncate(len),
            Self::Struct(s) => s.cycles.truncate(len),
            Self::PacketStream(p) => p.signals.truncate(len),
        }
    }
}

/// # Struct Trace
///
/// Per-cycle values of a named-field signal group. `fields` is the canonical
/// field order; every entry of `cycles` aligns index-for-index with it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct StructTrace {
    /// Field names, canonical order
    pub fields: Vec<String>,
    /// Per-cycle values, one inner entry per field
    pub cycles: Vec<Vec<TraceValue>>,
}
impl StructTrace {
    /// Index of field `name` in the canonical order
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
    /// The field-name → value mapping for cycle `cycle`
    pub fn cycle(&self, cycle: usize) -> Option<BTreeMap<&str, TraceValue>> {
        let vals = self.cycles.get(cycle)?;
        Some(
            self.fields
                .iter()
                .map(String::as_str)
                .zip(vals.iter().copied())
                .collect(),
        )
    }
}

/// # Packet Trace
///
/// A framed packet stream: the per-cycle payload trace, the frames closed by
/// the frame-flag, and whatever payload the capture window cut off before
/// its closing flag. An unterminated tail is data, not an error.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PacketTrace {
    /// Per-cycle payload values
    pub signals: Vec<TraceValue>,
    /// Completed packets, in capture order
    pub packets: Vec<Vec<TraceValue>>,
    /// Payload recorded after the last closed frame
    pub incomplete_packet: Vec<TraceValue>,
}

/// # Packet Side-File Column Layout
///
/// Names of the payload and frame-flag columns in a packet capture table.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PacketColumns {
    /// Payload column name
    pub payload: String,
    /// Frame-flag column name; a truthy cell closes the current packet
    pub last: String,
}
impl Default for PacketColumns {
    fn default() -> Self {
        DEFAULT_PACKET_COLUMNS.clone()
    }
}

/// # Argument Kind
///
/// Caller-declared reconstruction tag for one top-level argument, consumed
/// from the argument-type table. Tags outside the recognized set are
/// preserved for the caller's own dispatch and treated like `Plain` here.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ArgKind {
    Plain,
    List,
    Interface,
    PacketStream,
    Other(String),
}
impl ArgKind {
    /// Classify a raw argument-type tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "plain" => Self::Plain,
            "list" => Self::List,
            "interface" => Self::Interface,
            "packet-stream" => Self::PacketStream,
            other => Self::Other(other.to_string()),
        }
    }
}
impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::Plain => "plain",
            Self::List => "list",
            Self::Interface => "interface",
            Self::PacketStream => "packet-stream",
            Self::Other(tag) => tag.as_str(),
        };
        write!(f, "{}", s)
    }
}

/// Ordered mapping from caller argument names to their traces
pub type TraceMap = BTreeMap<String, SignalTrace>;

/// # Trace Bundle
///
/// The reconciled result of one cosimulation: the external (dut) and
/// reference traces, indexed by the caller's argument names and trimmed to
/// the same cycle count.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct TraceBundle {
    /// Traces recorded by the external simulator, gaps filled from reference
    pub dut: TraceMap,
    /// Traces produced by the reference simulation
    pub reference: TraceMap,
}

/// # External Capture
///
/// Raw recorded output of one external simulation run: the flat per-cycle
/// signal dump, plus one packet side-table per packetized argument.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Capture {
    /// Per-cycle signal dump text, columnar, headers in the 3-token grammar
    pub dump: String,
    /// Packet side-table text, keyed by packetized argument name
    #[serde(default)]
    pub packet_logs: BTreeMap<String, String>,
}

use super::read::DecodeErrorType;

/// # Cosim Error Enumeration
#[derive(Debug)]
pub enum CosimError {
    /// Invalid component or port configuration
    Config(String),
    /// Name override referencing an undeclared port
    UnknownPort { component: String, port: String },
    /// Malformed signal-dump protocol
    Decode {
        tp: DecodeErrorType,
        header: String,
    },
    /// Wrapped errors, generally from other crates
    Boxed(Box<dyn std::error::Error>),
    /// String message-valued errors
    Str(String),
}
impl From<crate::utils::ser::Error> for CosimError {
    fn from(e: crate::utils::ser::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<std::io::Error> for CosimError {
    fn from(e: std::io::Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}
impl From<String> for CosimError {
    /// Convert string-based errors by wrapping them
    fn from(e: String) -> Self {
        Self::Str(e)
    }
}
impl From<&str> for CosimError {
    /// Convert string-based errors by wrapping them
    fn from(e: &str) -> Self {
        Self::Str(e.into())
    }
}
impl std::fmt::Display for CosimError {
    /// Delegates to the [Debug] implementation
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        std::fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for CosimError {}

/// Cosim21 Library-Wide Result Type
pub type CosimResult<T> = Result<T, CosimError>;

// Implement the serialization to/from file trait for the main exchanged values
impl crate::utils::SerdeFile for IpCore {}
impl crate::utils::SerdeFile for TraceBundle {}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_core() -> IpCore {
        IpCore::new(
            "mac",
            "mult_add",
            "xilinx.com",
            "ip",
            "2.1",
            vec![
                Port::new("a", PortKind::Signed(25), PortDirection::Input, "A"),
                Port::new("b", PortKind::Signed(18), PortDirection::Input, "B"),
                Port::new("p", PortKind::Signed(48), PortDirection::Output, "P"),
                Port::new("clock", PortKind::Bool, PortDirection::Input, "CLK"),
            ],
            vec![("use_mult".to_string(), "true".to_string())],
        )
        .unwrap()
    }

    #[test]
    fn it_validates_port_widths() {
        let err = IpCore::new(
            "bad",
            "ip",
            "v",
            "l",
            "1.0",
            vec![Port::new("z", PortKind::Unsigned(0), PortDirection::Input, "Z")],
            Vec::new(),
        );
        assert!(matches!(err, Err(CosimError::Config(_))));
    }

    #[test]
    fn it_rejects_duplicate_external_names() {
        let err = IpCore::new(
            "bad",
            "ip",
            "v",
            "l",
            "1.0",
            vec![
                Port::new("a", PortKind::Bool, PortDirection::Input, "X"),
                Port::new("b", PortKind::Bool, PortDirection::Input, "X"),
            ],
            Vec::new(),
        );
        assert!(matches!(err, Err(CosimError::Config(_))));
    }

    #[test]
    fn it_numbers_instances_monotonically() -> CosimResult<()> {
        // Instance numbers strictly increase, across languages and override
        // variants, and are never handed out twice.
        let mut core = mac_core();
        let i0 = core.create_instance(HdlLanguage::Vhdl, &[])?;
        let i1 = core.create_instance(HdlLanguage::Verilog, &[("a", "the_a_signal")])?;
        let i2 = core.create_instance(HdlLanguage::Vhdl, &[])?;
        assert_eq!(i0.index, 0);
        assert_eq!(i1.index, 1);
        assert_eq!(i2.index, 2);
        assert_eq!(i0.name, "mac_0");
        assert_eq!(i2.name, "mac_2");
        assert_eq!(core.instances_created(), 3);
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_override_ports() {
        let mut core = mac_core();
        let err = core.create_instance(HdlLanguage::Vhdl, &[("nonesuch", "sig")]);
        assert!(matches!(
            err,
            Err(CosimError::UnknownPort { ref port, .. }) if port == "nonesuch"
        ));
        // The failed call must not consume an instance number
        assert_eq!(core.instances_created(), 0);
    }

    #[test]
    fn it_maps_kind_widths() {
        assert_eq!(PortKind::Bool.width(), 1);
        assert_eq!(PortKind::Signed(48).width(), 48);
        assert_eq!(PortKind::Unsigned(2).width(), 2);
        assert_eq!(PortKind::Signed(48).signal_kind(), SignalKind::Signed);
    }

    #[test]
    fn it_classifies_arg_tags() {
        assert_eq!(ArgKind::from_tag("packet-stream"), ArgKind::PacketStream);
        assert_eq!(ArgKind::from_tag("interface"), ArgKind::Interface);
        assert_eq!(
            ArgKind::from_tag("custom_reset"),
            ArgKind::Other("custom_reset".to_string())
        );
    }
}
