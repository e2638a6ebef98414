//!
//! # Trace Decoding Module
//!
//! Reads the external simulator's flat per-cycle signal dump and
//! reconstructs typed, per-argument traces of the same shape the reference
//! simulation produces: scalars, index-ordered lists, named-field structs,
//! and framed packet streams. Values the external tool could not resolve
//! decode to [TraceValue::Undefined]; malformed protocol is a fatal
//! [CosimError::Decode].
//!

// Std-Lib
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

// Crates.io Imports
use serde::{Deserialize, Serialize};

// Cosim21 Imports
use crate::utils::EnumStr;

// Local imports
use super::data::*;

/// Parse signal-dump content from file `fname`
pub fn parse_file(fname: impl AsRef<Path>) -> CosimResult<SignalDump> {
    let mut file = std::fs::File::open(fname)?;
    let mut src = String::new();
    file.read_to_string(&mut src)?;
    parse_str(&src)
}

/// Parse signal-dump content `src` from string.
/// The first non-empty row holds one header per column, each in the
/// three-token grammar `<container> <value-kind> <qualified-name>`;
/// every following row holds one cell per column for one cycle.
pub fn parse_str(src: &str) -> CosimResult<SignalDump> {
    let mut rows = src.lines().filter(|line| !line.trim().is_empty());
    let headers = match rows.next() {
        Some(row) => row,
        None => return Ok(SignalDump::default()),
    };
    let mut columns = Vec::new();
    for header in headers.split(',') {
        columns.push(parse_header(header)?);
    }
    for row in rows {
        let cells: Vec<&str> = row.split(',').map(str::trim).collect();
        for (num, col) in columns.iter_mut().enumerate() {
            // A short row leaves its missing cells unresolved
            let txt = cells.get(num).copied().unwrap_or("");
            let value = decode_cell(col.kind, txt);
            col.cells.push(value);
        }
    }
    Ok(SignalDump { columns })
}

/// # Signal Dump
///
/// The parsed form of one external capture file: typed columns of per-cycle
/// cell values, still flat (not yet regrouped into containers).
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignalDump {
    pub columns: Vec<Column>,
}
impl SignalDump {
    /// Number of recorded cycles, the length of the longest column
    pub fn cycles(&self) -> usize {
        self.columns.iter().map(|c| c.cells.len()).max().unwrap_or(0)
    }
}

/// # Dump Column
///
/// One column of the capture: its header classification and decoded cells.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Column {
    /// Container kind, first header token
    pub container: ContainerKind,
    /// Value kind, second header token
    pub kind: SignalKind,
    /// Qualified name, third header token
    pub name: String,
    /// Decoded per-cycle values
    pub cells: Vec<TraceValue>,
}

/// Parse a column header in the three-token grammar.
/// Anything else is malformed protocol, not recoverable data.
pub(crate) fn parse_header(txt: &str) -> CosimResult<Column> {
    let toks: Vec<&str> = txt.split_whitespace().collect();
    if toks.len() != 3 {
        return fail(DecodeErrorType::MalformedHeader, txt);
    }
    let container = match ContainerKind::from_str(toks[0]) {
        Some(container) => container,
        None => return fail(DecodeErrorType::UnknownContainer, txt),
    };
    let kind = match SignalKind::from_str(toks[1]) {
        Some(kind) => kind,
        None => return fail(DecodeErrorType::UnknownSignalKind, txt),
    };
    Ok(Column {
        container,
        kind,
        name: toks[2].to_string(),
        cells: Vec::new(),
    })
}

/// Decode one cell of text into a [TraceValue].
/// Boolean cells are `0`/`1`; all other kinds are fixed-width bit patterns
/// reinterpreted per `kind`. Anything unparseable - including widths beyond
/// 64 bits - is the external tool's representation of an unresolved value
/// and decodes to `Undefined`, never to zero.
pub fn decode_cell(kind: SignalKind, txt: &str) -> TraceValue {
    match kind {
        SignalKind::Bool => match txt {
            "0" => TraceValue::Bool(false),
            "1" => TraceValue::Bool(true),
            _ => TraceValue::Undefined,
        },
        SignalKind::Unsigned => match parse_bits(txt) {
            Some((value, _)) => TraceValue::Unsigned(value),
            None => TraceValue::Undefined,
        },
        SignalKind::Signed => match parse_bits(txt) {
            Some((value, width)) => {
                // Sign-extend from the cell's own width
                let shift = 64 - width as u32;
                TraceValue::Signed(((value << shift) as i64) >> shift)
            }
            None => TraceValue::Undefined,
        },
    }
}

/// Parse a fixed-width bit-pattern cell, returning the value and its width.
/// Strictly binary digits, one to 64 of them.
fn parse_bits(txt: &str) -> Option<(u64, usize)> {
    if txt.is_empty() || txt.len() > 64 || !txt.bytes().all(|b| b == b'0' || b == b'1') {
        return None;
    }
    let value = u64::from_str_radix(txt, 2).ok()?;
    Some((value, txt.len()))
}

/// Split a `list` qualified name `<name>[<index>]` into its parts
fn parse_list_name(name: &str) -> CosimResult<(&str, usize)> {
    let open = match name.find('[') {
        Some(open) => open,
        None => return fail(DecodeErrorType::MalformedQualifiedName, name),
    };
    if !name.ends_with(']') || open == 0 {
        return fail(DecodeErrorType::MalformedQualifiedName, name);
    }
    let index = match name[open + 1..name.len() - 1].parse::<usize>() {
        Ok(index) => index,
        Err(_) => return fail(DecodeErrorType::MalformedQualifiedName, name),
    };
    Ok((&name[..open], index))
}

/// Split an `interface` qualified name `<name>.<field>` into its parts.
/// Exactly one level of nesting is supported.
fn parse_interface_name(name: &str) -> CosimResult<(&str, &str)> {
    let parts: Vec<&str> = name.split('.').collect();
    match parts[..] {
        [group, field] if !group.is_empty() && !field.is_empty() => Ok((group, field)),
        [_] => fail(DecodeErrorType::MalformedQualifiedName, name),
        _ => fail(DecodeErrorType::NestedInterface, name),
    }
}

/// Reconstruct per-argument traces from the flat `dump`, merged over the
/// reference run's output mapping. Every recorded name overwrites its entry
/// in a copy of `reference`; struct fields and list indices not recorded by
/// the external run keep the reference values, cycle for cycle.
pub fn reconstruct(dump: &SignalDump, reference: &TraceMap) -> CosimResult<TraceMap> {
    let mut dut = reference.clone();

    // Group the flat columns by container kind
    let mut lists: BTreeMap<String, BTreeMap<usize, &Vec<TraceValue>>> = BTreeMap::new();
    let mut interfaces: BTreeMap<String, Vec<(String, &Vec<TraceValue>)>> = BTreeMap::new();
    for col in dump.columns.iter() {
        match col.container {
            ContainerKind::Plain => {
                dut.insert(col.name.clone(), SignalTrace::Scalar(col.cells.clone()));
            }
            ContainerKind::List => {
                let (name, index) = parse_list_name(&col.name)?;
                lists
                    .entry(name.to_string())
                    .or_default()
                    .insert(index, &col.cells);
            }
            ContainerKind::Interface => {
                let (name, field) = parse_interface_name(&col.name)?;
                interfaces
                    .entry(name.to_string())
                    .or_default()
                    .push((field.to_string(), &col.cells));
            }
        }
    }

    // BTreeMap keying gives the strictly-numeric index order, independent of
    // the order columns appeared in the dump
    for (name, elements) in lists {
        let merged = merge_list(reference.get(&name), &elements);
        dut.insert(name, SignalTrace::List(merged));
    }
    for (name, fields) in interfaces {
        let merged = merge_struct(reference.get(&name), &fields);
        dut.insert(name, SignalTrace::Struct(merged));
    }
    Ok(dut)
}

/// Zip recorded list elements into per-cycle rows, overwriting the recorded
/// indices of the reference rows where a reference list exists.
fn merge_list(
    reference: Option<&SignalTrace>,
    elements: &BTreeMap<usize, &Vec<TraceValue>>,
) -> Vec<Vec<TraceValue>> {
    let recorded_cycles = elements.values().map(|cells| cells.len()).min().unwrap_or(0);
    match reference {
        Some(SignalTrace::List(ref_rows)) => {
            let cycles = recorded_cycles.min(ref_rows.len());
            let mut rows = Vec::with_capacity(cycles);
            for cycle in 0..cycles {
                let mut row = ref_rows[cycle].clone();
                for (&index, cells) in elements.iter() {
                    if index >= row.len() {
                        row.resize(index + 1, TraceValue::Undefined);
                    }
                    row[index] = cells[cycle];
                }
                rows.push(row);
            }
            rows
        }
        _ => {
            // No reference shape to merge over: compact the recorded
            // elements in ascending index order
            let mut rows = Vec::with_capacity(recorded_cycles);
            for cycle in 0..recorded_cycles {
                rows.push(elements.values().map(|cells| cells[cycle]).collect());
            }
            rows
        }
    }
}

/// Assemble recorded interface fields into per-cycle rows in the canonical
/// field order, which the reference skeleton declares. Reference-only fields
/// keep their reference values; fields recorded but absent from the skeleton
/// are appended after the canonical ones, sorted by name.
fn merge_struct(
    reference: Option<&SignalTrace>,
    recorded: &[(String, &Vec<TraceValue>)],
) -> StructTrace {
    let ref_struct = match reference {
        Some(SignalTrace::Struct(s)) => Some(s),
        _ => None,
    };
    let mut fields: Vec<String> = match ref_struct {
        Some(s) => s.fields.clone(),
        None => Vec::new(),
    };
    let mut appended: Vec<&String> = recorded
        .iter()
        .map(|(field, _)| field)
        .filter(|field| !fields.contains(*field))
        .collect();
    appended.sort();
    fields.extend(appended.into_iter().cloned());

    let recorded_cycles = recorded.iter().map(|(_, cells)| cells.len()).min().unwrap_or(0);
    let cycles = match ref_struct {
        Some(s) => recorded_cycles.min(s.cycles.len()),
        None => recorded_cycles,
    };

    let mut out = StructTrace {
        fields: fields.clone(),
        cycles: Vec::with_capacity(cycles),
    };
    for cycle in 0..cycles {
        let mut row = vec![TraceValue::Undefined; fields.len()];
        if let Some(s) = ref_struct {
            // Canonical fields lead the order, so reference values map 1:1
            for (slot, value) in row.iter_mut().zip(s.cycles[cycle].iter()) {
                *slot = *value;
            }
        }
        for (field, cells) in recorded.iter() {
            let num = out.field_index(field).unwrap();
            row[num] = cells[cycle];
        }
        out.cycles.push(row);
    }
    out
}

/// Fold a packet side-table into completed packets plus the unterminated
/// remainder. Payload cells decode per `kind`; a truthy frame-flag cell
/// closes the current packet. A missing frame-flag column never closes, so
/// everything lands in the remainder - unterminated data, not an error.
pub fn decode_packets(
    src: &str,
    columns: &PacketColumns,
    kind: SignalKind,
) -> CosimResult<(Vec<Vec<TraceValue>>, Vec<TraceValue>)> {
    let mut rows = src.lines().filter(|line| !line.trim().is_empty());
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok((Vec::new(), Vec::new())),
    };
    let names: Vec<&str> = header.split(',').map(str::trim).collect();
    let payload = match names.iter().position(|name| *name == columns.payload) {
        Some(num) => num,
        None => return fail(DecodeErrorType::MissingPayloadColumn, header),
    };
    let last = names.iter().position(|name| *name == columns.last);

    let mut packets = Vec::new();
    let mut packet = Vec::new();
    for row in rows {
        let cells: Vec<&str> = row.split(',').map(str::trim).collect();
        let txt = cells.get(payload).copied().unwrap_or("");
        packet.push(decode_cell(kind, txt));
        let closed = last
            .and_then(|num| cells.get(num))
            .map(|txt| txt.parse::<i64>().map(|flag| flag != 0).unwrap_or(false))
            .unwrap_or(false);
        if closed {
            packets.push(std::mem::take(&mut packet));
        }
    }
    Ok((packets, packet))
}

/// Trim both sides of a cosimulation to the reference run's recorded length,
/// per argument. The external run incurs [PROPAGATION_OFFSET] extra cycles
/// of propagation; whatever it recorded beyond the reference length is
/// discarded.
pub fn align(dut: &mut TraceMap, reference: &mut TraceMap) {
    for (name, ref_trace) in reference.iter_mut() {
        let cycles = ref_trace.len();
        if let Some(dut_trace) = dut.get_mut(name) {
            dut_trace.truncate(cycles);
        }
        ref_trace.truncate(cycles);
    }
}

/// Decode one external [Capture] into a reconciled [TraceBundle]:
/// parse the dump, regroup containers over the reference skeleton, reattach
/// packet streams for the arguments the type table marks packetized, and
/// trim both sides to the common cycle window.
pub fn decode(
    capture: &Capture,
    arg_kinds: &BTreeMap<String, ArgKind>,
    reference: &TraceMap,
    columns: &PacketColumns,
) -> CosimResult<TraceBundle> {
    let dump = parse_str(&capture.dump)?;
    log::debug!(
        "decoding {} columns x {} cycles over {} reference arguments",
        dump.columns.len(),
        dump.cycles(),
        reference.len()
    );
    let mut dut = reconstruct(&dump, reference)?;

    for (name, kind) in arg_kinds.iter() {
        if *kind != ArgKind::PacketStream {
            continue;
        }
        let (packets, incomplete_packet) = match capture.packet_logs.get(name) {
            Some(src) => decode_packets(src, columns, SignalKind::Unsigned)?,
            None => {
                log::warn!("no packet capture recorded for argument {}", name);
                (Vec::new(), Vec::new())
            }
        };
        let signals = match dut.remove(name) {
            Some(SignalTrace::Scalar(vals)) => vals,
            Some(SignalTrace::PacketStream(p)) => p.signals,
            _ => Vec::new(),
        };
        dut.insert(
            name.clone(),
            SignalTrace::PacketStream(PacketTrace {
                signals,
                packets,
                incomplete_packet,
            }),
        );
    }

    let mut reference = reference.clone();
    align(&mut dut, &mut reference);
    Ok(TraceBundle { dut, reference })
}

/// Error-Generation Helper
fn fail<T>(tp: DecodeErrorType, header: impl Into<String>) -> CosimResult<T> {
    Err(CosimError::Decode {
        tp,
        header: header.into(),
    })
}

/// Enumerated decode failures, all malformed protocol rather than data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeErrorType {
    /// Header with other than three whitespace-delimited tokens
    MalformedHeader,
    /// Unrecognized container-kind token
    UnknownContainer,
    /// Unrecognized value-kind token
    UnknownSignalKind,
    /// List name without a valid `[index]`, or interface name without a field
    MalformedQualifiedName,
    /// Interface nesting deeper than one level
    NestedInterface,
    /// Packet side-table without its payload column
    MissingPayloadColumn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_cells() {
        use SignalKind::{Bool, Signed, Unsigned};
        assert_eq!(decode_cell(Bool, "0"), TraceValue::Bool(false));
        assert_eq!(decode_cell(Bool, "1"), TraceValue::Bool(true));
        // Booleans are strictly 0/1
        assert_eq!(decode_cell(Bool, "10"), TraceValue::Undefined);

        assert_eq!(decode_cell(Unsigned, "0101"), TraceValue::Unsigned(5));
        // Two's-complement reinterpretation at the cell's own width
        assert_eq!(decode_cell(Signed, "111"), TraceValue::Signed(-1));
        assert_eq!(decode_cell(Signed, "011"), TraceValue::Signed(3));
        assert_eq!(decode_cell(Signed, "100"), TraceValue::Signed(-4));

        // Unresolved markers, empty cells, sign characters, over-wide
        // patterns: all undefined, none wrapped or zeroed
        assert_eq!(decode_cell(Unsigned, "xxxx"), TraceValue::Undefined);
        assert_eq!(decode_cell(Unsigned, ""), TraceValue::Undefined);
        assert_eq!(decode_cell(Unsigned, "+101"), TraceValue::Undefined);
        assert_eq!(decode_cell(Signed, &"1".repeat(65)), TraceValue::Undefined);
        assert_eq!(
            decode_cell(Signed, &"1".repeat(64)),
            TraceValue::Signed(-1)
        );
    }

    #[test]
    fn it_rejects_malformed_headers() {
        let tp = |r: CosimResult<Column>| match r {
            Err(CosimError::Decode { tp, .. }) => tp,
            other => panic!("expected decode error, got {:?}", other),
        };
        assert_eq!(
            tp(parse_header("plain bool")),
            DecodeErrorType::MalformedHeader
        );
        assert_eq!(
            tp(parse_header("plain bool a b")),
            DecodeErrorType::MalformedHeader
        );
        assert_eq!(
            tp(parse_header("struct bool foo")),
            DecodeErrorType::UnknownContainer
        );
        assert_eq!(
            tp(parse_header("plain decimal foo")),
            DecodeErrorType::UnknownSignalKind
        );
        assert!(parse_header("plain bool foo").is_ok());
    }

    #[test]
    fn it_rejects_nested_interfaces() {
        let src = "interface bool foo.bar.baz\n0\n";
        let dump = parse_str(src).unwrap();
        let err = reconstruct(&dump, &TraceMap::new());
        assert!(matches!(
            err,
            Err(CosimError::Decode {
                tp: DecodeErrorType::NestedInterface,
                ..
            })
        ));
    }

    #[test]
    fn it_rejects_malformed_list_names() {
        let src = "list unsigned xs\n01\n";
        let dump = parse_str(src).unwrap();
        let err = reconstruct(&dump, &TraceMap::new());
        assert!(matches!(
            err,
            Err(CosimError::Decode {
                tp: DecodeErrorType::MalformedQualifiedName,
                ..
            })
        ));
    }

    #[test]
    fn it_reorders_shuffled_lists() -> CosimResult<()> {
        // Discovery order of list columns must not matter
        let forward = "list unsigned xs[0],list unsigned xs[1],list unsigned xs[2]\n\
                       00,01,10\n\
                       11,00,01\n";
        let shuffled = "list unsigned xs[2],list unsigned xs[0],list unsigned xs[1]\n\
                        10,00,01\n\
                        01,11,00\n";
        let a = reconstruct(&parse_str(forward)?, &TraceMap::new())?;
        let b = reconstruct(&parse_str(shuffled)?, &TraceMap::new())?;
        assert_eq!(a, b);
        use TraceValue::Unsigned;
        assert_eq!(
            a.get("xs"),
            Some(&SignalTrace::List(vec![
                vec![Unsigned(0), Unsigned(1), Unsigned(2)],
                vec![Unsigned(3), Unsigned(0), Unsigned(1)],
            ]))
        );
        Ok(())
    }

    #[test]
    fn it_preserves_reference_fields_in_structs() -> CosimResult<()> {
        use TraceValue::{Bool, Unsigned};
        // The reference skeleton declares the canonical order, including an
        // input field the external run never records
        let mut reference = TraceMap::new();
        reference.insert(
            "bus".to_string(),
            SignalTrace::Struct(StructTrace {
                fields: vec!["valid".to_string(), "data".to_string()],
                cycles: vec![
                    vec![Bool(true), Unsigned(7)],
                    vec![Bool(false), Unsigned(8)],
                ],
            }),
        );
        let src = "interface unsigned bus.data\n0001\n0010\n0011\n";
        let dut = reconstruct(&parse_str(src)?, &reference)?;
        assert_eq!(
            dut.get("bus"),
            Some(&SignalTrace::Struct(StructTrace {
                fields: vec!["valid".to_string(), "data".to_string()],
                cycles: vec![
                    vec![Bool(true), Unsigned(1)],
                    vec![Bool(false), Unsigned(2)],
                ],
            }))
        );
        Ok(())
    }

    #[test]
    fn it_reassembles_packets() -> CosimResult<()> {
        use TraceValue::Unsigned;
        let columns = PacketColumns::default();
        let src = "TDATA,TLAST\n001,0\n010,0\n011,1\n100,0\n101,1\n";
        let (packets, rest) = decode_packets(src, &columns, SignalKind::Unsigned)?;
        assert_eq!(
            packets,
            vec![
                vec![Unsigned(1), Unsigned(2), Unsigned(3)],
                vec![Unsigned(4), Unsigned(5)],
            ]
        );
        assert!(rest.is_empty());

        let src = "TDATA,TLAST\n001,0\n010,0\n011,1\n100,0\n101,0\n";
        let (packets, rest) = decode_packets(src, &columns, SignalKind::Unsigned)?;
        assert_eq!(packets, vec![vec![Unsigned(1), Unsigned(2), Unsigned(3)]]);
        assert_eq!(rest, vec![Unsigned(4), Unsigned(5)]);
        Ok(())
    }

    #[test]
    fn it_requires_the_payload_column() {
        let err = decode_packets(
            "NOTDATA,TLAST\n0,0\n",
            &PacketColumns::default(),
            SignalKind::Unsigned,
        );
        assert!(matches!(
            err,
            Err(CosimError::Decode {
                tp: DecodeErrorType::MissingPayloadColumn,
                ..
            })
        ));
    }

    #[test]
    fn it_trims_to_the_reference_window() {
        use TraceValue::Bool;
        let mut reference = TraceMap::new();
        reference.insert(
            "flag".to_string(),
            SignalTrace::Scalar(vec![Bool(false); 20]),
        );
        let mut dut = TraceMap::new();
        // One extra cycle of propagation in the external capture
        dut.insert("flag".to_string(), SignalTrace::Scalar(vec![Bool(true); 21]));
        align(&mut dut, &mut reference);
        assert_eq!(dut.get("flag").unwrap().len(), 20);
        assert_eq!(reference.get("flag").unwrap().len(), 20);
    }
}
