//! Training request assembly and the submission lifecycle.
//!
//! [`build_request`] turns the session's independently edited pieces into one
//! payload; [`TrainingSession`] owns those pieces, runs decodes, previews and
//! submissions on background threads, and applies only results whose request
//! id or generation still matches the current selection.

mod jobs;
mod lifecycle;
mod request;
mod session;

pub use lifecycle::{Lifecycle, TRANSPORT_FAILURE_MESSAGE, interpret_response};
pub use request::{
    ColumnMeta, ColumnValue, DataFrame, DataRow, NumericInput, RequestError, TrainBody,
    TrainingRequestPayload, build_request,
};
pub use session::{PreviewError, TrainingSession};
