//!
//! # Wrapper & Instance Generation Module
//!
//! Emits the three artifacts derived from an [IpCore]:
//! the VHDL boundary wrapper adapting caller-side signed/unsigned words to
//! the component's raw bit-vectors, per-language instantiation fragments with
//! deferred-substitution signal placeholders, and the configuration-script
//! fragment that creates and configures the component in the external tool.
//!

// Standard Lib Imports
use std::io::Write;
use std::ops::{AddAssign, SubAssign};
use std::path::{Path, PathBuf};

// Local imports
use super::data::*;

/// Architecture name given to every generated wrapper body.
/// Instantiation fragments bind to `entity work.<entity>(<this>)`.
pub const WRAPPER_ARCHITECTURE: &str = "boundary";

/// Write the VHDL boundary wrapper for `core` to a `<entity_name>.vhd` file
/// in directory `dir`, returning the written path.
/// Refuses to overwrite an existing file.
pub fn save_wrapper(core: &IpCore, dir: impl AsRef<Path>) -> CosimResult<PathBuf> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(CosimError::Str(format!("{:?} is not a directory", dir)));
    }
    let fname = dir.join(format!("{}.vhd", core.entity_name));
    if fname.exists() {
        return Err(CosimError::Str(format!(
            "File {:?} already exists - refusing to overwrite it",
            fname
        )));
    }
    log::debug!("writing boundary wrapper for {} to {:?}", core.entity_name, fname);
    let f = std::fs::File::create(&fname)?;
    WrapperWriter::new(f).write_wrapper(core)?;
    Ok(fname)
}

/// Render the VHDL boundary wrapper for `core` to [String]
pub fn wrapper_to_string(core: &IpCore) -> CosimResult<String> {
    let mut buf = Vec::new();
    WrapperWriter::new(&mut buf).write_wrapper(core)?;
    let rv = std::str::from_utf8(buf.as_slice()).unwrap().to_string();
    Ok(rv)
}

/// The boundary-signal name for `port`: the fixed marker plus the internal
/// port name, underscore-joined. This prefix is what associates each raw
/// vector signal and cast line with its originating port.
fn boundary_signal(port: &Port) -> String {
    format!("{}_{}", WRAPPED_MARKER, port.name)
}

/// Caller-side VHDL type for `port`
fn entity_type(port: &Port) -> &'static str {
    match port.kind {
        PortKind::Bool => "std_logic",
        PortKind::Signed(_) => "signed",
        PortKind::Unsigned(_) => "unsigned",
    }
}

/// Raw component-side VHDL type for `port`
fn raw_type(port: &Port) -> &'static str {
    if port.kind.width() > 1 {
        "std_logic_vector"
    } else {
        "std_logic"
    }
}

/// VHDL vector-range suffix for `port`, empty for single-bit ports
fn size_suffix(port: &Port) -> String {
    let width = port.kind.width();
    if width > 1 {
        format!("({} downto 0)", width - 1)
    } else {
        String::new()
    }
}

/// VHDL direction keyword
fn direction(port: &Port) -> &'static str {
    match port.direction {
        PortDirection::Input => "in",
        PortDirection::Output => "out",
    }
}

/// # Wrapper Writing Helper
pub struct WrapperWriter<'wr> {
    /// Write Destination
    dest: Box<dyn Write + 'wr>,
    /// Indentation Helper
    indent: Indent,
}
impl<'wr> WrapperWriter<'wr> {
    /// Create a new [WrapperWriter] to destination `dest`.
    /// Destination is boxed internally.
    fn new(dest: impl Write + 'wr) -> Self {
        Self {
            dest: Box::new(dest),
            indent: Indent::new("    "),
        }
    }
    /// Write the full wrapper body for `core` to the destination
    fn write_wrapper(&mut self, core: &IpCore) -> CosimResult<()> {
        let module = core.module_name();

        self.write_line(format_args!("library IEEE;"))?;
        self.write_line(format_args!("use IEEE.std_logic_1164.all;"))?;
        self.write_line(format_args!("use IEEE.numeric_std.all;"))?;
        self.blank()?;

        // The caller-facing entity, typed in the caller's signed/unsigned terms
        self.write_line(format_args!("entity {} is", core.entity_name))?;
        self.indent += 1;
        self.write_line(format_args!("port ("))?;
        self.indent += 1;
        for (num, port) in core.ports.iter().enumerate() {
            let sep = if num + 1 == core.ports.len() { "" } else { ";" };
            self.write_line(format_args!(
                "{}: {} {}{}{}",
                port.name,
                direction(port),
                entity_type(port),
                size_suffix(port),
                sep
            ))?;
        }
        self.indent -= 1;
        self.write_line(format_args!(");"))?;
        self.indent -= 1;
        self.write_line(format_args!("end entity {};", core.entity_name))?;
        self.blank()?;

        self.write_line(format_args!(
            "architecture {} of {} is",
            WRAPPER_ARCHITECTURE, core.entity_name
        ))?;
        self.blank()?;

        // The black-box component declaration, in its raw bit-vector terms
        self.indent += 1;
        self.write_line(format_args!("component {}", module))?;
        self.indent += 1;
        self.write_line(format_args!("port ("))?;
        self.indent += 1;
        for (num, port) in core.ports.iter().enumerate() {
            let sep = if num + 1 == core.ports.len() { "" } else { ";" };
            self.write_line(format_args!(
                "{}: {} {}{}{}",
                port.ip_name,
                direction(port),
                raw_type(port),
                size_suffix(port),
                sep
            ))?;
        }
        self.indent -= 1;
        self.write_line(format_args!(");"))?;
        self.indent -= 1;
        self.write_line(format_args!("end component {};", module))?;
        self.blank()?;

        // One raw boundary signal per port, marker-prefixed
        for port in core.ports.iter() {
            self.write_line(format_args!(
                "signal {}: {}{};",
                boundary_signal(port),
                raw_type(port),
                size_suffix(port)
            ))?;
        }
        self.indent -= 1;
        self.blank()?;
        self.write_line(format_args!("begin"))?;
        self.blank()?;
        self.indent += 1;

        // Direction-appropriate casts between the two representations.
        // Single-bit ports share a type on both sides; no cast for them.
        for port in core.ports.iter() {
            let wrapped = boundary_signal(port);
            let line = match (port.direction, port.kind.width()) {
                (PortDirection::Input, w) if w > 1 => {
                    format!("{} <= {}({});", wrapped, raw_type(port), port.name)
                }
                (PortDirection::Input, _) => format!("{} <= {};", wrapped, port.name),
                (PortDirection::Output, w) if w > 1 => {
                    format!("{} <= {}({});", port.name, entity_type(port), wrapped)
                }
                (PortDirection::Output, _) => format!("{} <= {};", port.name, wrapped),
            };
            self.write_line(format_args!("{}", line))?;
        }
        self.blank()?;

        self.write_line(format_args!("ip_instance : {}", module))?;
        self.write_line(format_args!("port map ("))?;
        self.indent += 1;
        for (num, port) in core.ports.iter().enumerate() {
            let sep = if num + 1 == core.ports.len() { "" } else { "," };
            self.write_line(format_args!(
                "{} => {}{}",
                port.ip_name,
                boundary_signal(port),
                sep
            ))?;
        }
        self.indent -= 1;
        self.write_line(format_args!(");"))?;
        self.indent -= 1;
        self.blank()?;
        self.write_line(format_args!(
            "end architecture {};",
            WRAPPER_ARCHITECTURE
        ))?;
        self.dest.flush()?;
        Ok(())
    }
    /// Helper function writing a single line at the current indentation level.
    fn write_line(&mut self, args: std::fmt::Arguments) -> std::io::Result<()> {
        writeln!(self.dest, "{}{}", self.indent.state, args)
    }
    /// Write an empty separator line
    fn blank(&mut self) -> std::io::Result<()> {
        writeln!(self.dest)
    }
}

/// Render the instantiation fragment for one numbered instance of `core`.
/// Signal names are wrapped in `${...}` deferred-substitution placeholders,
/// resolved later by the structural-source generator. `overrides` substitutes
/// caller-supplied signal names for port names; callers are pre-validated by
/// [IpCore::create_instance].
pub(crate) fn instantiation(
    core: &IpCore,
    instance_name: &str,
    lang: HdlLanguage,
    overrides: &[(&str, &str)],
) -> String {
    let resolved = |port: &Port| -> String {
        overrides
            .iter()
            .find(|(name, _)| *name == port.name)
            .map(|(_, subst)| subst.to_string())
            .unwrap_or_else(|| port.name.clone())
    };
    match lang {
        HdlLanguage::Vhdl => {
            // Dotted (grouped-signal) names flatten to underscores on both
            // sides of the mapping
            let mappings = core
                .ports
                .iter()
                .map(|p| {
                    format!(
                        "{}=>${{{}}}",
                        p.name.replace('.', "_"),
                        resolved(p).replace('.', "_")
                    )
                })
                .collect::<Vec<String>>()
                .join(",\n    ");
            format!(
                "{}: entity work.{}({})\nport map (\n    {}\n);\n",
                instance_name, core.entity_name, WRAPPER_ARCHITECTURE, mappings
            )
        }
        HdlLanguage::Verilog => {
            // Self-contained: binds the component's raw ports directly
            let mappings = core
                .ports
                .iter()
                .map(|p| format!(".{}(${{{}}})", p.ip_name, resolved(p)))
                .collect::<Vec<String>>()
                .join(",\n    ");
            format!(
                "{} {} (\n    {}\n);\n",
                core.module_name(),
                instance_name,
                mappings
            )
        }
    }
}

/// Render the configuration-script fragment for `core`: one creation
/// statement, one statement applying every config option verbatim, and one
/// statement requesting build-artifact generation.
pub(crate) fn tcl_fragment(core: &IpCore) -> String {
    use TclKey::{
        All, CreateIp, Dict, GenerateTarget, GetIps, Library, List, ModuleName, Name, SetProperty,
        Vendor, Version,
    };
    let module = core.module_name();
    let create = format!(
        "{} {} {} {} {} {} {} {} {} {} {}\n",
        CreateIp,
        Name,
        core.ip_name,
        Vendor,
        core.vendor,
        Library,
        core.library,
        Version,
        core.version,
        ModuleName,
        module
    );
    let options = core
        .config
        .iter()
        .map(|(option, value)| format!("CONFIG.{} {{{}}}", option, value))
        .collect::<Vec<String>>()
        .join(" ");
    let configure = format!(
        "{} {} [{} {}] [{} {}]\n",
        SetProperty, Dict, List, options, GetIps, module
    );
    let generate = format!("{} {} [{} {}]\n", GenerateTarget, All, GetIps, module);
    create + &configure + &generate
}

/// Indentation Helper
struct Indent {
    unit: String,
    level: usize,
    state: String,
}
impl Indent {
    /// Create a new [Indent], initially at level 0
    fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            level: 0,
            state: String::new(),
        }
    }
}
impl AddAssign<usize> for Indent {
    fn add_assign(&mut self, rhs: usize) {
        self.level += rhs;
        self.state = self.unit.repeat(self.level);
    }
}
impl SubAssign<usize> for Indent {
    fn sub_assign(&mut self, rhs: usize) {
        if rhs > self.level {
            panic!("Indentation cannot go below 0");
        }
        self.level -= rhs;
        self.state = self.unit.repeat(self.level);
    }
}

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
                Port::new("opmode", PortKind::Unsigned(2), PortDirection::Input, "SEL"),
                Port::new("p", PortKind::Signed(48), PortDirection::Output, "P"),
                Port::new("clock", PortKind::Bool, PortDirection::Input, "CLK"),
            ],
            vec![("use_mult".to_string(), "true".to_string())],
        )
        .unwrap()
    }

    #[test]
    fn it_writes_wrapper_casts() -> CosimResult<()> {
        let wrapper = wrapper_to_string(&mac_core())?;

        // Entity ports carry the caller's types
        assert!(wrapper.contains("a: in signed(24 downto 0)"));
        assert!(wrapper.contains("opmode: in unsigned(1 downto 0)"));
        assert!(wrapper.contains("p: out signed(47 downto 0)"));
        assert!(wrapper.contains("clock: in std_logic"));

        // Boundary signals are marker-prefixed raw vectors
        assert!(wrapper.contains("signal wrapped_a: std_logic_vector(24 downto 0);"));
        assert!(wrapper.contains("signal wrapped_clock: std_logic;"));

        // Input casts caller->raw, output casts raw->caller
        assert!(wrapper.contains("wrapped_a <= std_logic_vector(a);"));
        assert!(wrapper.contains("p <= signed(wrapped_p);"));
        // Single-bit ports assign without a cast
        assert!(wrapper.contains("wrapped_clock <= clock;"));
        assert!(!wrapper.contains("std_logic(clock)"));

        // The component binds its raw names to the boundary signals
        assert!(wrapper.contains("component mult_add_mac"));
        assert!(wrapper.contains("CLK => wrapped_clock"));
        Ok(())
    }

    #[test]
    fn it_writes_instantiations() {
        let core = mac_core();
        let vhdl = instantiation(&core, "mac_0", HdlLanguage::Vhdl, &[("a", "dsp.a_in")]);
        assert!(vhdl.starts_with("mac_0: entity work.mac(boundary)"));
        // Overridden and dotted names flatten, placeholders defer resolution
        assert!(vhdl.contains("a=>${dsp_a_in}"));
        assert!(vhdl.contains("clock=>${clock}"));

        let verilog = instantiation(&core, "mac_1", HdlLanguage::Verilog, &[]);
        assert!(verilog.starts_with("mult_add_mac mac_1 ("));
        assert!(verilog.contains(".SEL(${opmode})"));
        assert!(verilog.contains(".CLK(${clock})"));
    }

    #[test]
    fn it_writes_tcl() {
        let tcl = tcl_fragment(&mac_core());
        assert_eq!(
            tcl,
            "create_ip -name mult_add -vendor xilinx.com -library ip -version 2.1 -module_name mult_add_mac\n\
             set_property -dict [list CONFIG.use_mult {true}] [get_ips mult_add_mac]\n\
             generate_target all [get_ips mult_add_mac]\n"
        );
    }

    #[test]
    fn it_refuses_overwrite() -> CosimResult<()> {
        let dir = std::env::temp_dir().join("cosim21_write_test");
        std::fs::create_dir_all(&dir)?;
        // Fresh directory per run
        let target = dir.join("mac.vhd");
        if target.exists() {
            std::fs::remove_file(&target)?;
        }
        let written = save_wrapper(&mac_core(), &dir)?;
        assert_eq!(written, target);
        assert!(save_wrapper(&mac_core(), &dir).is_err());
        std::fs::remove_file(&target)?;
        Ok(())
    }
}
