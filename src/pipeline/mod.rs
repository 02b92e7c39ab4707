pub mod batch;
pub mod enhancer;
pub mod loader;
pub mod oracle;
pub mod orchestrator;
pub mod prompt_templates;
pub mod reconcile;
pub mod scan;
