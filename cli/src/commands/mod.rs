pub mod check;
pub mod comparables;
pub mod run;
pub mod sites;
