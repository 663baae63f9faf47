//! Command-stream geometry codec: decodes/encodes `vector_tile.proto`'s packed
//! `geometry` field into extent-space integer coordinate geometries.

use crate::error::{PmtError, PmtResult};

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// A geometry's coarse MVT type, carried alongside the raw command stream on every
/// feature (`vector_tile.proto`'s `Tile.GeomType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeometryType {
    /// No geometry, or a type this crate does not know how to interpret.
    Unknown = 0,
    /// One or more points.
    Point = 1,
    /// One or more lines.
    LineString = 2,
    /// One or more (possibly holed) polygons.
    Polygon = 3,
}

impl From<u64> for GeometryType {
    fn from(value: u64) -> Self {
        match value {
            1 => GeometryType::Point,
            2 => GeometryType::LineString,
            3 => GeometryType::Polygon,
            _ => GeometryType::Unknown,
        }
    }
}

/// A ring's winding direction, per the signed shoelace area of its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Clockwise,
    CounterClockwise,
}

/// A single polygon: one exterior ring plus zero or more interior (hole) rings.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<(i32, i32)>,
    pub holes: Vec<Vec<(i32, i32)>>,
}

/// A decoded feature geometry, in extent-space integer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// One point (`len() == 1`) or a multi-point.
    Point(Vec<(i32, i32)>),
    /// One line (`len() == 1`) or a multi-line-string.
    LineString(Vec<Vec<(i32, i32)>>),
    /// One polygon (`len() == 1`) or a multi-polygon.
    Polygon(Vec<Polygon>),
}

fn pack_command(command: u32, count: u32) -> u32 {
    (count << 3) | command
}

fn unpack_command(cmd_int: u32) -> (u32, u32) {
    (cmd_int & 0x7, cmd_int >> 3)
}

/// A geometry's individual parts as contiguous slices of one backing coordinate
/// buffer, avoiding a per-ring allocation while decoding.
struct PartedCoords {
    coords: Vec<(i32, i32)>,
    parts: Vec<std::ops::Range<usize>>,
}

/// Decodes a packed command stream into its constituent parts.
///
/// The single coordinate-sequence allocation is sized exactly up front: the number of
/// coordinates is `(ordinate_words / 2) + close_path_count`, computed by a cheap
/// pre-pass over the command stream before the real decode.
fn decode_parts(commands: &[u32]) -> PmtResult<PartedCoords> {
    let mut coord_count = 0usize;
    let mut i = 0usize;
    while i < commands.len() {
        let (cmd, count) = unpack_command(commands[i]);
        i += 1;
        match cmd {
            CMD_MOVE_TO | CMD_LINE_TO => {
                coord_count += count as usize;
                i += 2 * count as usize;
            }
            CMD_CLOSE_PATH => coord_count += 1,
            other => return Err(PmtError::InvalidMvt(format!("unknown geometry command {other}"))),
        }
    }
    if i != commands.len() {
        return Err(PmtError::InvalidMvt("geometry command stream truncated".into()));
    }

    let mut coords = Vec::with_capacity(coord_count);
    let mut parts = Vec::new();
    let (mut x, mut y) = (0i32, 0i32);
    let mut part_start = 0usize;

    let mut i = 0usize;
    while i < commands.len() {
        let (cmd, count) = unpack_command(commands[i]);
        i += 1;
        match cmd {
            CMD_MOVE_TO => {
                if coords.len() > part_start {
                    parts.push(part_start..coords.len());
                }
                part_start = coords.len();
                for _ in 0..count {
                    x += super::wire::zigzag_decode(u64::from(commands[i])) as i32;
                    y += super::wire::zigzag_decode(u64::from(commands[i + 1])) as i32;
                    i += 2;
                    coords.push((x, y));
                }
            }
            CMD_LINE_TO => {
                for _ in 0..count {
                    x += super::wire::zigzag_decode(u64::from(commands[i])) as i32;
                    y += super::wire::zigzag_decode(u64::from(commands[i + 1])) as i32;
                    i += 2;
                    coords.push((x, y));
                }
            }
            CMD_CLOSE_PATH => {
                if let Some(&start) = coords.get(part_start) {
                    coords.push(start);
                }
            }
            _ => unreachable!("validated in the pre-pass above"),
        }
    }
    if coords.len() > part_start {
        parts.push(part_start..coords.len());
    }

    Ok(PartedCoords { coords, parts })
}

fn signed_area(ring: &[(i32, i32)]) -> f64 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % ring.len()];
        area += f64::from(x0) * f64::from(y1) - f64::from(x1) * f64::from(y0);
    }
    area / 2.0
}

/// A ring's winding direction, or `None` if its (near-)zero area makes it degenerate.
fn winding(ring: &[(i32, i32)]) -> Option<Winding> {
    let area = signed_area(ring);
    if area > 0.0 {
        Some(Winding::Clockwise)
    } else if area < 0.0 {
        Some(Winding::CounterClockwise)
    } else {
        None
    }
}

/// Assembles exterior/hole rings into polygons: a ring sharing the first ring's
/// winding starts a new polygon, the opposite winding attaches as a hole to the
/// current polygon. Zero-area rings are dropped as degenerate.
fn assemble_polygons(rings: Vec<Vec<(i32, i32)>>) -> Vec<Polygon> {
    let mut polygons = Vec::new();
    let mut exterior_winding = None;

    for ring in rings {
        let Some(w) = winding(&ring) else { continue };
        let exterior = *exterior_winding.get_or_insert(w);

        if w == exterior {
            polygons.push(Polygon {
                exterior: ring,
                holes: Vec::new(),
            });
        } else if let Some(last) = polygons.last_mut() {
            last.holes.push(ring);
        }
        // A hole-wound ring with no preceding exterior is malformed input; dropped
        // silently since there is no well-defined polygon to attach it to.
    }

    polygons
}

/// Decodes `commands` (the raw values of `Feature.geometry`) into a [`Geometry`] for
/// the feature's declared `geometry_type`.
pub(crate) fn decode(geometry_type: GeometryType, commands: &[u32]) -> PmtResult<Geometry> {
    let parted = decode_parts(commands)?;
    let rings: Vec<Vec<(i32, i32)>> = parted
        .parts
        .iter()
        .map(|range| parted.coords[range.clone()].to_vec())
        .collect();

    match geometry_type {
        GeometryType::Point => Ok(Geometry::Point(parted.coords)),
        GeometryType::LineString => Ok(Geometry::LineString(rings)),
        GeometryType::Polygon => Ok(Geometry::Polygon(assemble_polygons(rings))),
        GeometryType::Unknown => Err(PmtError::InvalidMvt("feature has unknown geometry type".into())),
    }
}

/// The `[min, max]` range a coordinate is quantized into before encoding, per the
/// encoder's `extent`/`buffer` configuration.
fn clip_bounds(extent: u32, buffer: u32) -> (i32, i32) {
    let min = -i64::from(buffer);
    let max = i64::from(extent) + i64::from(buffer);
    (
        min.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        max.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
    )
}

fn clip_point(p: (i32, i32), min: i32, max: i32) -> (i32, i32) {
    (p.0.clamp(min, max), p.1.clamp(min, max))
}

fn encode_ring(buf: &mut Vec<u32>, ring: &[(i32, i32)], cursor: &mut (i32, i32), closed: bool, bounds: (i32, i32)) {
    if ring.is_empty() {
        return;
    }
    let (min, max) = bounds;
    let first = clip_point(ring[0], min, max);
    buf.push(pack_command(CMD_MOVE_TO, 1));
    buf.push(super::wire::zigzag_encode(i64::from(first.0 - cursor.0)) as u32);
    buf.push(super::wire::zigzag_encode(i64::from(first.1 - cursor.1)) as u32);
    *cursor = first;

    let line_to_count = ring.len() - 1;
    if line_to_count > 0 {
        buf.push(pack_command(CMD_LINE_TO, line_to_count as u32));
        for &p in &ring[1..] {
            let (x, y) = clip_point(p, min, max);
            buf.push(super::wire::zigzag_encode(i64::from(x - cursor.0)) as u32);
            buf.push(super::wire::zigzag_encode(i64::from(y - cursor.1)) as u32);
            *cursor = (x, y);
        }
    }
    if closed {
        buf.push(pack_command(CMD_CLOSE_PATH, 1));
    }
}

/// Re-orients `ring` to have the given winding, reversing it if necessary.
fn oriented(mut ring: Vec<(i32, i32)>, want: Winding) -> Vec<(i32, i32)> {
    if winding(&ring) != Some(want) {
        ring.reverse();
    }
    ring
}

/// Encodes `geometry` into a packed command stream, reorienting polygon rings so
/// exteriors are clockwise and holes counter-clockwise, and quantizing every
/// coordinate into `[-buffer, extent+buffer]` first.
pub(crate) fn encode(geometry: &Geometry, extent: u32, buffer: u32) -> Vec<u32> {
    let mut buf = Vec::new();
    let mut cursor = (0i32, 0i32);
    let bounds = clip_bounds(extent, buffer);

    match geometry {
        Geometry::Point(points) => {
            if !points.is_empty() {
                buf.push(pack_command(CMD_MOVE_TO, points.len() as u32));
                for &p in points {
                    let (x, y) = clip_point(p, bounds.0, bounds.1);
                    buf.push(super::wire::zigzag_encode(i64::from(x - cursor.0)) as u32);
                    buf.push(super::wire::zigzag_encode(i64::from(y - cursor.1)) as u32);
                    cursor = (x, y);
                }
            }
        }
        Geometry::LineString(lines) => {
            for line in lines {
                encode_ring(&mut buf, line, &mut cursor, false, bounds);
            }
        }
        Geometry::Polygon(polygons) => {
            for polygon in polygons {
                let exterior = oriented(polygon.exterior.clone(), Winding::Clockwise);
                encode_ring(&mut buf, &exterior, &mut cursor, true, bounds);
                for hole in &polygon.holes {
                    let hole = oriented(hole.clone(), Winding::CounterClockwise);
                    encode_ring(&mut buf, &hole, &mut cursor, true, bounds);
                }
            }
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, GeometryType, Geometry, Polygon};

    #[test]
    fn decodes_single_point() {
        // packCmd(MoveTo, 1)=9, zigzag(2)=4, zigzag(3)=6
        let geometry = decode(GeometryType::Point, &[9, 4, 6]).unwrap();
        assert_eq!(geometry, Geometry::Point(vec![(2, 3)]));
    }

    #[test]
    fn decodes_polygon_with_hole() {
        // Outer CW square (0,0)-(10,0)-(10,10)-(0,10), inner CCW square (2,2)-(2,8)-(8,8)-(8,2)
        let outer = vec![(0, 0), (10, 0), (10, 10), (0, 10)];
        let inner = vec![(2, 2), (2, 8), (8, 8), (8, 2)];
        assert_eq!(super::winding(&outer), Some(super::Winding::Clockwise));
        assert_eq!(super::winding(&inner), Some(super::Winding::CounterClockwise));

        let mut cursor = (0, 0);
        let mut buf = Vec::new();
        let bounds = super::clip_bounds(4096, 0);
        super::encode_ring(&mut buf, &outer, &mut cursor, true, bounds);
        super::encode_ring(&mut buf, &inner, &mut cursor, true, bounds);

        let geometry = decode(GeometryType::Polygon, &buf).unwrap();
        match geometry {
            Geometry::Polygon(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].holes.len(), 1);
            }
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let geometry = Geometry::Polygon(vec![Polygon {
            exterior: vec![(0, 0), (10, 0), (10, 10), (0, 10)],
            holes: vec![vec![(2, 2), (2, 8), (8, 8), (8, 2)]],
        }]);
        let commands = encode(&geometry, 4096, 0);
        let decoded = decode(GeometryType::Polygon, &commands).unwrap();
        assert_eq!(decoded, geometry);
    }

    #[test]
    fn degenerate_zero_area_ring_is_dropped() {
        // A "ring" with zero area (a straight back-and-forth line).
        let degenerate = vec![(0, 0), (5, 0), (0, 0)];
        let outer = vec![(0, 0), (10, 0), (10, 10), (0, 10)];

        let mut cursor = (0, 0);
        let mut buf = Vec::new();
        let bounds = super::clip_bounds(4096, 0);
        super::encode_ring(&mut buf, &degenerate, &mut cursor, true, bounds);
        super::encode_ring(&mut buf, &outer, &mut cursor, true, bounds);

        let geometry = decode(GeometryType::Polygon, &buf).unwrap();
        match geometry {
            Geometry::Polygon(polys) => assert_eq!(polys.len(), 1),
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn coordinates_outside_the_buffered_extent_are_clamped() {
        let geometry = Geometry::Point(vec![(-500, 5000)]);
        let commands = encode(&geometry, 4096, 64);
        let decoded = decode(GeometryType::Point, &commands).unwrap();
        assert_eq!(decoded, Geometry::Point(vec![(-64, 4160)]));
    }
}
