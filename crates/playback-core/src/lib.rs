pub mod context;
pub mod error;
pub mod filter;
pub mod params;
pub mod response;
pub mod spatial;

pub use context::RequestContext;
pub use error::{QueryError, Result};
pub use filter::LocationStatsFilter;
pub use params::QueryParams;
pub use response::{ApiResponse, ErrorDetail, ErrorResponse, Metadata, Status};
pub use spatial::{BoundingBox, Coordinates, Interval, Resolution};
