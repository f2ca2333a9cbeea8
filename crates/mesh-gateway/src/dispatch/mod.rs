//! Request dispatch: route resolution, channel selection, and completion
//! reconciliation.

pub mod dispatcher;
pub mod headers;

pub use dispatcher::{DispatchOutcome, DispatchSettings, RequestDispatcher};
pub use headers::forwarded_headers;
