use server_api::{ApiContext, SessionKeys};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) sessions: SessionKeys,
    pub(crate) max_upload_bytes: usize,
}

/// Subject of the verified admin session, attached to admin requests.
#[derive(Debug, Clone)]
pub(crate) struct AdminSession(pub(crate) String);
