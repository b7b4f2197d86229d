pub mod orchestrator;

pub use orchestrator::CompanyResearcher;
