pub mod doctor;
pub mod stats;
