pub mod direction;
pub mod instrument;
pub mod performance;
pub mod request_params;

pub use direction::Direction;
pub use instrument::{Board, InstrumentClass, InstrumentCode};
pub use performance::{DataPoint, PerformanceRecord, Provenance};
pub use request_params::{BatchRequest, CalendarRequest, ChangeRow, SingleRequest};
