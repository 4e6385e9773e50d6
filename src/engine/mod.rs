pub mod assignment;
pub mod matching;
pub mod payment;
pub mod pricing;
pub mod queue;
pub mod workflow;
