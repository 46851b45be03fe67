// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Leads ---
        handlers::leads::create_lead,
        handlers::leads::list_leads,
        handlers::leads::get_lead,
        handlers::leads::update_lead,
        handlers::leads::run_triage,
        handlers::leads::get_timeline,
        handlers::leads::log_contact,
        handlers::leads::send_message,
        handlers::leads::convert_lead,

        // --- Follow-ups ---
        handlers::followups::list_follow_ups,
        handlers::followups::schedule_follow_ups,
        handlers::followups::cancel_follow_ups,
        handlers::followups::process_due,
        handlers::followups::follow_up_stats,

        // --- Webhooks ---
        handlers::webhooks::verify_whatsapp,
        handlers::webhooks::receive_whatsapp,

        // --- Settings ---
        handlers::settings::get_clinic_settings,
        handlers::settings::update_clinic_settings,
    ),
    components(
        schemas(
            // --- Leads ---
            models::lead::LeadStatus,
            models::lead::Lead,
            models::lead::LeadDetail,
            models::lead::Patient,
            models::lead::SentMessage,

            // --- Triagem ---
            models::triage::Intent,
            models::triage::LeadScore,
            models::triage::UrgencyLevel,
            models::triage::TriageResult,

            // --- Timeline ---
            models::timeline::TimelineEvent,
            models::timeline::SortOrder,

            // --- Follow-ups ---
            models::followup::ScheduledMessage,
            models::followup::CohortOutcome,
            models::followup::OutcomeStatus,
            models::followup::FollowUpOutcome,
            models::followup::ProcessResult,
            models::followup::FollowUpStats,
            handlers::followups::CancelResponse,

            // --- Settings ---
            models::settings::ClinicSettings,
            models::settings::UpdateClinicSettingsRequest,

            // --- Webhooks ---
            models::webhook::WhatsAppEnvelope,
            models::webhook::WhatsAppEntry,
            models::webhook::WhatsAppChange,
            models::webhook::WhatsAppValue,
            models::webhook::WhatsAppContact,
            models::webhook::WhatsAppProfile,
            models::webhook::WhatsAppMessage,
            models::webhook::WhatsAppText,
            models::webhook::WhatsAppButton,
            models::webhook::WhatsAppInteractive,
            models::webhook::WhatsAppReply,
            services::webhook_service::WebhookReceipt,

            // --- Payloads ---
            handlers::leads::CreateLeadPayload,
            handlers::leads::UpdateLeadPayload,
            handlers::leads::TriagePayload,
            handlers::leads::ContactPayload,
            handlers::leads::MessagePayload,
            handlers::leads::ConvertPayload,
        )
    ),
    tags(
        (name = "Leads", description = "Funil de leads: cadastro, triagem, timeline e conversão"),
        (name = "Follow-ups", description = "Mensagens agendadas e processamento pelo cron"),
        (name = "Webhooks", description = "Entrada de mensagens do WhatsApp"),
        (name = "Settings", description = "Prompt e base de conhecimento da clínica")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "cron_secret",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
