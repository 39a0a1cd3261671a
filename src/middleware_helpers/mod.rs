pub mod request_id;
pub mod tenant;

pub use request_id::{
    configure_http_tracing, current_request_id, request_id_middleware, scope_request_id,
    RequestId, RequestSpanMaker, REQUEST_ID_HEADER,
};
pub use tenant::{tenant_middleware, TenantContext, TENANT_ID_HEADER};
