//! Local ancestry inference for admixed samples.
//!
//! Each query genotype is modelled as copied from two unknown reference
//! parents at every site. A two-parent HMM is decoded with an n-best Viterbi
//! (`viterbi`), the traceback paths are phase corrected and mapped to
//! population labels, then voted on and smoothed (`ancestry`). `hmm` ties the
//! pieces together for one sample.

pub mod ancestry;
pub mod args;
pub mod data;
pub mod emission;
pub mod gmap;
pub mod hmm;
pub mod matrix;
pub mod model;
pub mod samples;
pub mod sites;
pub mod transition;
pub mod viterbi;
