pub mod classifier;
pub mod followup_service;
pub mod lead_service;
pub mod messenger;
pub mod webhook_service;
