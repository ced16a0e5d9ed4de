//! Numerical routines underpinning the simulation pipeline.

pub mod fdr;
pub mod ols;
