pub mod followups;
pub mod leads;
pub mod settings;
pub mod webhooks;
