use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fieldstock API",
        version = "0.3.0",
        description = r#"
# Fieldstock Invoice Capture & Mobile Inventory API

Field sales agents photograph supplier invoices; the API extracts structured
line items through a vision model, reconciles them against the shared product
catalog, and keeps a per-agent vehicle stock ledger.

## Agent identity

Every request carries the acting agent in the `X-Agent-Id` header (a UUID).
Authentication sits in front of this service and is out of scope here.

## Capture vs. commit

`POST /invoices/capture` runs extraction only and returns a reviewable
result; nothing is persisted beyond the photos. `POST /invoices` commits the
reviewed document, creates it `pending`, and loads its lines onto the
agent's vehicle. `POST /invoices/{id}/deliver` unloads them again.

## Pagination

List endpoints take `page` (default 1) and `limit` (default 20).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "invoices", description = "Capture pipeline and invoice lifecycle"),
        (name = "stock", description = "Vehicle stock balances and movement history"),
        (name = "categories", description = "Product category tree")
    ),
    paths(
        crate::handlers::invoices::capture_invoice,
        crate::handlers::invoices::commit_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::replace_invoice_items,
        crate::handlers::invoices::deliver_invoice,
        crate::handlers::invoices::cancel_invoice,
        crate::handlers::stock::list_balances,
        crate::handlers::stock::list_movements,
        crate::handlers::stock::adjust_stock,
        crate::handlers::categories::list_categories,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::handlers::invoices::CaptureRequest,
            crate::handlers::invoices::ReplaceItemsRequest,
            crate::handlers::stock::AdjustStockRequest,
            crate::services::capture::CaptureOutcome,
            crate::services::capture::ResolvedLine,
            crate::services::invoices::CommitInvoiceInput,
            crate::services::invoices::CommitLineInput,
            crate::services::invoices::InvoiceWithItems,
            crate::extraction::types::ExtractedInvoice,
            crate::extraction::types::ExtractedItem,
            crate::entities::invoice::InvoiceStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
