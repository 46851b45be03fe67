pub mod cron;
pub mod i18n;
