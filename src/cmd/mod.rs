pub mod check;
pub mod profiles;
pub mod report;
pub mod run;
