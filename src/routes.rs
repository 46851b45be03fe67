// src/routes.rs

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers};

pub fn build_router(app_state: AppState) -> Router {
    // Funil de leads (uso interno da clínica)
    let lead_routes = Router::new()
        .route("/",
               post(handlers::leads::create_lead)
               .get(handlers::leads::list_leads)
        )
        .route("/{id}",
               get(handlers::leads::get_lead)
               .patch(handlers::leads::update_lead)
        )
        .route("/{id}/triage", post(handlers::leads::run_triage))
        .route("/{id}/timeline", get(handlers::leads::get_timeline))
        .route("/{id}/contacts", post(handlers::leads::log_contact))
        .route("/{id}/messages", post(handlers::leads::send_message))
        .route("/{id}/convert", post(handlers::leads::convert_lead))
        .route("/{id}/followups",
               get(handlers::followups::list_follow_ups)
               .post(handlers::followups::schedule_follow_ups)
               .delete(handlers::followups::cancel_follow_ups)
        );

    // Disparado pelo agendador externo (protegido pelo CRON_SECRET no extrator)
    let followup_routes = Router::new().route("/process",
        post(handlers::followups::process_due)
        .get(handlers::followups::follow_up_stats)
    );

    let webhook_routes = Router::new().route("/whatsapp",
        get(handlers::webhooks::verify_whatsapp)
        .post(handlers::webhooks::receive_whatsapp)
    );

    let settings_routes = Router::new().route("/clinic",
        get(handlers::settings::get_clinic_settings)
        .put(handlers::settings::update_clinic_settings)
    );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/leads", lead_routes)
        .nest("/api/followups", followup_routes)
        .nest("/api/webhooks", webhook_routes)
        .nest("/api/settings", settings_routes)
        .with_state(app_state)
}
