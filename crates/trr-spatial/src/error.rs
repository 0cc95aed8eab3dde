use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeomError>;

#[derive(Debug, Error)]
pub enum GeomError {
    #[error("invalid WKT: {0}")]
    InvalidWkt(String),
    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
}
