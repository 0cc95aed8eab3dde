//! WKT/GeoJSON codec (spec.md §4.1 C1)

use crate::error::{GeomError, Result};
use serde_json::{json, Value};

/// A single ring: a closed sequence of (lon, lat) vertices.
pub type Ring = Vec<(f64, f64)>;

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point { lon: f64, lat: f64 },
    /// First ring is the exterior, the rest are holes.
    Polygon { rings: Vec<Ring> },
}

/// Parses `POINT`, `POINT Z`, and `POLYGON` WKT. Whitespace-tolerant,
/// case-insensitive. Coordinates are (lon, lat).
pub fn parse_wkt(text: &str) -> Result<Geometry> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();

    if let Some(rest) = strip_tag(&upper, trimmed, "POINT Z") {
        return parse_point(rest, true);
    }
    if let Some(rest) = strip_tag(&upper, trimmed, "POINT") {
        return parse_point(rest, false);
    }
    if let Some(rest) = strip_tag(&upper, trimmed, "POLYGON") {
        return parse_polygon(rest);
    }

    Err(GeomError::InvalidWkt(format!("unrecognized WKT: {text}")))
}

/// Strips a case-insensitive leading tag and returns the remainder of the
/// *original* (case-preserving) string, trimmed.
fn strip_tag<'a>(upper: &str, original: &'a str, tag: &str) -> Option<&'a str> {
    if upper.starts_with(tag) {
        Some(original[tag.len()..].trim())
    } else {
        None
    }
}

fn parse_point(body: &str, has_z: bool) -> Result<Geometry> {
    let inner = body
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| GeomError::InvalidWkt("point missing parens".into()))?;
    let nums: Vec<f64> = inner
        .split_whitespace()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| GeomError::InvalidWkt(format!("bad coordinate: {s}")))
        })
        .collect::<Result<_>>()?;
    let min_len = if has_z { 3 } else { 2 };
    if nums.len() < min_len {
        return Err(GeomError::InvalidWkt("point needs lon lat".into()));
    }
    Ok(Geometry::Point {
        lon: nums[0],
        lat: nums[1],
    })
}

fn parse_polygon(body: &str) -> Result<Geometry> {
    let inner = body
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| GeomError::InvalidWkt("polygon missing parens".into()))?;

    let mut rings = Vec::new();
    let mut depth: i32 = 0;
    let mut start = None;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = Some(i + 1);
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let s = start.ok_or_else(|| GeomError::InvalidWkt("unbalanced rings".into()))?;
                    rings.push(parse_ring(&inner[s..i])?);
                }
            }
            _ => {}
        }
    }
    if rings.is_empty() {
        return Err(GeomError::InvalidWkt("polygon has no rings".into()));
    }
    Ok(Geometry::Polygon { rings })
}

fn parse_ring(text: &str) -> Result<Ring> {
    text.split(',')
        .map(|pair| {
            let nums: Vec<f64> = pair
                .split_whitespace()
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| GeomError::InvalidWkt(format!("bad coordinate: {s}")))
                })
                .collect::<Result<_>>()?;
            if nums.len() < 2 {
                return Err(GeomError::InvalidWkt("ring vertex needs lon lat".into()));
            }
            Ok((nums[0], nums[1]))
        })
        .collect()
}

/// Renders a `Geometry` back to WKT. `parse_wkt(to_wkt(g)) == g` up to
/// whitespace/case.
pub fn to_wkt(g: &Geometry) -> String {
    match g {
        Geometry::Point { lon, lat } => format!("POINT({} {})", fmt_num(*lon), fmt_num(*lat)),
        Geometry::Polygon { rings } => {
            let body = rings
                .iter()
                .map(|r| {
                    let pts = r
                        .iter()
                        .map(|(lon, lat)| format!("{} {}", fmt_num(*lon), fmt_num(*lat)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({pts})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("POLYGON({body})")
        }
    }
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n}")
    } else {
        let s = format!("{n}");
        s
    }
}

/// Converts a `Geometry` to its GeoJSON representation.
pub fn to_geojson(g: &Geometry) -> Value {
    match g {
        Geometry::Point { lon, lat } => json!({
            "type": "Point",
            "coordinates": [lon, lat],
        }),
        Geometry::Polygon { rings } => {
            let coords: Vec<Vec<[f64; 2]>> = rings
                .iter()
                .map(|r| r.iter().map(|(lon, lat)| [*lon, *lat]).collect())
                .collect();
            json!({
                "type": "Polygon",
                "coordinates": coords,
            })
        }
    }
}

/// Parses a GeoJSON `Point` or `Polygon` geometry object.
pub fn from_geojson(value: &Value) -> Result<Geometry> {
    let type_ = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeomError::InvalidGeoJson("missing type".into()))?;

    match type_ {
        "Point" => {
            let coords = value
                .get("coordinates")
                .and_then(Value::as_array)
                .ok_or_else(|| GeomError::InvalidGeoJson("missing coordinates".into()))?;
            let lon = coords
                .first()
                .and_then(Value::as_f64)
                .ok_or_else(|| GeomError::InvalidGeoJson("missing lon".into()))?;
            let lat = coords
                .get(1)
                .and_then(Value::as_f64)
                .ok_or_else(|| GeomError::InvalidGeoJson("missing lat".into()))?;
            Ok(Geometry::Point { lon, lat })
        }
        "Polygon" => {
            let coords = value
                .get("coordinates")
                .and_then(Value::as_array)
                .ok_or_else(|| GeomError::InvalidGeoJson("missing coordinates".into()))?;
            let mut rings = Vec::new();
            for ring_val in coords {
                let ring_arr = ring_val
                    .as_array()
                    .ok_or_else(|| GeomError::InvalidGeoJson("ring is not an array".into()))?;
                let mut ring = Vec::new();
                for pt in ring_arr {
                    let pair = pt
                        .as_array()
                        .ok_or_else(|| GeomError::InvalidGeoJson("vertex is not an array".into()))?;
                    let lon = pair
                        .first()
                        .and_then(Value::as_f64)
                        .ok_or_else(|| GeomError::InvalidGeoJson("missing lon".into()))?;
                    let lat = pair
                        .get(1)
                        .and_then(Value::as_f64)
                        .ok_or_else(|| GeomError::InvalidGeoJson("missing lat".into()))?;
                    ring.push((lon, lat));
                }
                rings.push(ring);
            }
            if rings.is_empty() {
                return Err(GeomError::InvalidGeoJson("polygon has no rings".into()));
            }
            Ok(Geometry::Polygon { rings })
        }
        other => Err(GeomError::InvalidGeoJson(format!("unsupported type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_round_trips() {
        let g = parse_wkt("POINT(36.2 37.135)").unwrap();
        assert_eq!(g, Geometry::Point { lon: 36.2, lat: 37.135 });
        assert_eq!(to_wkt(&g), "POINT(36.2 37.135)");
    }

    #[test]
    fn point_is_case_and_whitespace_tolerant() {
        let g = parse_wkt("  point  ( 36.2   37.135 ) ").unwrap();
        assert_eq!(g, Geometry::Point { lon: 36.2, lat: 37.135 });
    }

    #[test]
    fn point_z_ignores_third_coordinate() {
        let g = parse_wkt("POINT Z(36.2 37.135 450)").unwrap();
        assert_eq!(g, Geometry::Point { lon: 36.2, lat: 37.135 });
    }

    #[test]
    fn polygon_with_hole_parses() {
        let wkt = "POLYGON((0 0, 0 10, 10 10, 10 0, 0 0), (2 2, 2 4, 4 4, 4 2, 2 2))";
        let g = parse_wkt(wkt).unwrap();
        match g {
            Geometry::Polygon { rings } => assert_eq!(rings.len(), 2),
            _ => panic!("expected polygon"),
        }
    }

    #[test]
    fn geojson_round_trips_point() {
        let g = Geometry::Point { lon: 1.5, lat: 2.5 };
        let j = to_geojson(&g);
        let back = from_geojson(&j).unwrap();
        assert_eq!(g, back);
    }

    #[test]
    fn geojson_round_trips_polygon() {
        let g = Geometry::Polygon {
            rings: vec![vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]],
        };
        let j = to_geojson(&g);
        let back = from_geojson(&j).unwrap();
        assert_eq!(g, back);
    }

    #[test]
    fn invalid_wkt_errors_instead_of_panicking() {
        assert!(parse_wkt("NOT A GEOMETRY").is_err());
        assert!(parse_wkt("POINT(1)").is_err());
    }
}
