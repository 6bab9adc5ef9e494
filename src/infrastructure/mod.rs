pub mod media;
pub mod model;
pub mod observability;
pub mod persistence;
pub mod storage;
