//! Path documents on disk.
//!
//! Two layouts are accepted:
//!
//! - a JSON array of `{ "lat": .., "lng": .. }` objects (`lon` is accepted
//!   as an alias for `lng`);
//! - GeoJSON: a `LineString` geometry, a `Feature` wrapping one, or a
//!   `FeatureCollection` whose first `LineString` feature is used.
//!
//! Files are read through `cap_std` rather than `std::fs`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use serde::Deserialize;
use tracing::debug;

use crate::domain::Coordinate;
use crate::domain::ports::{PathProvider, PathProviderError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PathDocument {
    Points(Vec<LatLngDto>),
    GeoJson(GeoJsonDto),
}

#[derive(Debug, Deserialize)]
struct LatLngDto {
    lat: f64,
    #[serde(alias = "lon")]
    lng: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonDto {
    FeatureCollection { features: Vec<FeatureDto> },
    Feature { geometry: Option<GeometryDto> },
    LineString { coordinates: Vec<Vec<f64>> },
}

#[derive(Debug, Deserialize)]
struct FeatureDto {
    geometry: Option<GeometryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeometryDto {
    LineString {
        coordinates: Vec<Vec<f64>>,
    },
    #[serde(other)]
    Other,
}

impl GeometryDto {
    fn into_line(self) -> Option<Vec<Vec<f64>>> {
        match self {
            Self::LineString { coordinates } => Some(coordinates),
            Self::Other => None,
        }
    }
}

/// Path provider backed by a JSON or GeoJSON file.
#[derive(Debug, Clone)]
pub struct PathFileProvider {
    path: PathBuf,
}

impl PathFileProvider {
    /// Provider reading `path` on every load.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this provider reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PathProvider for PathFileProvider {
    async fn load_path(&self) -> Result<Vec<Coordinate>, PathProviderError> {
        let path = self.path.clone();
        let contents = tokio::task::spawn_blocking(move || read_to_string(&path))
            .await
            .map_err(|error| PathProviderError::io(error.to_string()))?
            .map_err(|error| {
                PathProviderError::io(format!("{}: {error}", self.path.display()))
            })?;
        let coordinates = parse_path(&contents)?;
        debug!(
            path = %self.path.display(),
            vertices = coordinates.len(),
            "path file loaded"
        );
        Ok(coordinates)
    }
}

fn read_to_string(path: &Path) -> std::io::Result<String> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())?;
    directory.read_to_string(file_name)
}

/// Decode a path document into ordered coordinates.
///
/// # Errors
///
/// Returns [`PathProviderError::Parse`] for malformed documents and
/// [`PathProviderError::NoPath`] when the document holds no coordinates.
pub fn parse_path(contents: &str) -> Result<Vec<Coordinate>, PathProviderError> {
    let document: PathDocument = serde_json::from_str(contents).map_err(|_| {
        PathProviderError::parse(
            "expected a JSON array of {lat, lng} objects or a GeoJSON LineString",
        )
    })?;

    let coordinates = match document {
        PathDocument::Points(points) => points
            .into_iter()
            .map(|point| Coordinate::new(point.lat, point.lng))
            .collect(),
        PathDocument::GeoJson(geojson) => positions_to_coordinates(line_of(geojson)?)?,
    };

    if coordinates.is_empty() {
        return Err(PathProviderError::no_path());
    }
    Ok(coordinates)
}

fn line_of(geojson: GeoJsonDto) -> Result<Vec<Vec<f64>>, PathProviderError> {
    let line = match geojson {
        GeoJsonDto::LineString { coordinates } => Some(coordinates),
        GeoJsonDto::Feature { geometry } => geometry.and_then(GeometryDto::into_line),
        GeoJsonDto::FeatureCollection { features } => features
            .into_iter()
            .find_map(|feature| feature.geometry.and_then(GeometryDto::into_line)),
    };
    line.ok_or_else(|| PathProviderError::parse("GeoJSON document has no LineString geometry"))
}

fn positions_to_coordinates(
    positions: Vec<Vec<f64>>,
) -> Result<Vec<Coordinate>, PathProviderError> {
    positions
        .into_iter()
        .enumerate()
        .map(|(index, position)| match position.as_slice() {
            // GeoJSON positions are [longitude, latitude, (altitude)].
            [longitude, latitude, ..] => Ok(Coordinate::new(*latitude, *longitude)),
            _ => Err(PathProviderError::parse(format!(
                "position {index} must have at least two components"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    //! Document decoding and file access coverage.

    use super::*;
    use crate::test_support::write_temp_file;
    use rstest::rstest;

    const EXPECTED: [Coordinate; 2] = [
        Coordinate::new(55.9533, -3.1883),
        Coordinate::new(55.9540, -3.1890),
    ];

    #[rstest]
    #[case::lat_lng(r#"[{"lat":55.9533,"lng":-3.1883},{"lat":55.9540,"lng":-3.1890}]"#)]
    #[case::lat_lon(r#"[{"lat":55.9533,"lon":-3.1883},{"lat":55.9540,"lon":-3.1890}]"#)]
    #[case::line_string(
        r#"{"type":"LineString","coordinates":[[-3.1883,55.9533],[-3.1890,55.9540,12.0]]}"#
    )]
    #[case::feature(
        r#"{"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[-3.1883,55.9533],[-3.1890,55.9540]]}}"#
    )]
    #[case::collection(
        r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[0.0,0.0]}},
            {"type":"Feature","properties":{},"geometry":{"type":"LineString","coordinates":[[-3.1883,55.9533],[-3.1890,55.9540]]}}
        ]}"#
    )]
    fn decodes_supported_layouts(#[case] document: &str) {
        assert_eq!(parse_path(document).expect("document decodes"), EXPECTED);
    }

    #[rstest]
    #[case::empty_array("[]")]
    #[case::empty_line(r#"{"type":"LineString","coordinates":[]}"#)]
    fn empty_documents_have_no_path(#[case] document: &str) {
        assert_eq!(parse_path(document), Err(PathProviderError::NoPath));
    }

    #[rstest]
    #[case::not_json("lat,lng\n1,2")]
    #[case::point_only(r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[0.0,0.0]}}"#)]
    #[case::short_position(r#"{"type":"LineString","coordinates":[[1.0]]}"#)]
    fn malformed_documents_are_parse_errors(#[case] document: &str) {
        assert!(matches!(
            parse_path(document),
            Err(PathProviderError::Parse { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn loads_paths_from_disk() {
        let (_dir, path) = write_temp_file(
            "route.json",
            r#"[{"lat":55.9533,"lng":-3.1883},{"lat":55.9540,"lng":-3.1890}]"#,
        )
        .expect("write fixture");

        let provider = PathFileProvider::new(&path);
        assert_eq!(provider.path(), path.as_path());
        assert_eq!(provider.load_path().await.expect("path loads"), EXPECTED);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_files_are_io_errors() {
        let (dir, _path) = write_temp_file("present.json", "[]").expect("write fixture");
        let provider = PathFileProvider::new(dir.path().join("absent.json"));
        assert!(matches!(
            provider.load_path().await,
            Err(PathProviderError::Io { .. })
        ));
    }
}
