pub mod conversion;
pub mod messaging;
pub mod observability;
pub mod storage;
pub mod tracking;
