pub mod run;
pub mod workspace;
