use thiserror::Error;

/// Errors surfaced to the user by the temperature pipeline and the redraw cycle.
///
/// Backend plumbing (HTTP, file I/O, GeoTIFF decoding) stays in `anyhow` and is
/// wrapped transparently by [`LstError::Backend`].
#[derive(Debug, Error)]
pub enum LstError {
    /// No scene passed the date / bounds / cloud-cover filter
    #[error(
        "no scenes found between {start} and {end} with cloud cover below {max_cloud_cover}% for the selected region"
    )]
    EmptyCollection {
        start: String,
        end: String,
        max_cloud_cover: f64,
    },

    /// The statistics dictionary lacks a key, or the value is null
    #[error("statistic '{key}' is missing from the computed result")]
    MissingStatistic { key: String },

    #[error("no drawn shape to finalize: draw a polygon on the map first")]
    NoDrawnShape,

    #[error("drawing tool is not active: press the draw button before completing a shape")]
    DrawingInactive,

    /// A result arrived for a request that has since been superseded
    #[error("result for request #{generation} discarded: request #{latest} is newer")]
    StaleResult { generation: u64, latest: u64 },

    #[error("region covers {pixels} pixels, above the budget of {max_pixels}")]
    PixelBudgetExceeded { pixels: u64, max_pixels: u64 },

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("invalid date window: {0}")]
    InvalidDateWindow(String),

    #[error("invalid legend: {0}")]
    InvalidLegend(String),

    #[error("opacity must be within [0, 1], got {0}")]
    InvalidOpacity(f64),

    #[error("no temperature layer is displayed")]
    NoLayer,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collection_message() {
        let err = LstError::EmptyCollection {
            start: "2020-09-01".to_string(),
            end: "2020-09-30".to_string(),
            max_cloud_cover: 10.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("2020-09-01"));
        assert!(msg.contains("10%"));
    }

    #[test]
    fn test_backend_is_transparent() {
        let err: LstError = anyhow::anyhow!("connection refused").into();
        assert_eq!(err.to_string(), "connection refused");
    }
}
