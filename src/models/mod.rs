pub mod generation;
pub mod job;
pub mod quality;
pub mod run;
