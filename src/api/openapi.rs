//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the genjob REST API
///
/// Served at `/openapi.json`, and through Swagger UI at `/swagger-ui`
/// when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "genjob REST API",
        version = "0.1.0",
        description = "Submit media generation jobs and receive the materialized artifact once the provider's long-running operation finishes",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8787", description = "Local development server")
    ),
    paths(
        crate::api::routes::generate,
        crate::api::routes::generate_video,
        crate::api::routes::generate_image,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::GenerationRequest,
        crate::types::GenerationSettings,
        crate::types::GenerationKind,
        crate::types::AspectRatio,
        crate::types::Resolution,
        crate::types::ArtifactDescriptor,
        crate::types::ArtifactStatus,
        crate::types::FailureInfo,
        crate::types::SourceStrategy,
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::JobPhase,
        crate::types::AttemptOutcome,
        crate::types::Event,
        crate::api::routes::GenerateQuery,
        crate::error::FailureReason,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "generate", description = "Run generation jobs end to end"),
        (name = "jobs", description = "Coarse progress of running and finished jobs"),
        (name = "system", description = "Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `X-Api-Key` scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
