pub mod followup;
pub mod lead;
pub mod settings;
pub mod timeline;
pub mod triage;
pub mod webhook;
