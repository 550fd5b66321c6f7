pub mod backup;
pub mod cleaner;
