use super::{CacheRequest, ResponseMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineSkipReason {
    ResponseUrlMissing,
    MimeTypeMissing,
    ErrorStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineStorePlan {
    /// Not an offline request; it belongs to the ordinary HTTP cache.
    Bypass,
    Skip(OfflineSkipReason),
    Store,
}

/// Decides whether a response to `request` goes into the offline disk cache.
pub fn plan_offline_store(request: &CacheRequest, metadata: &ResponseMetadata) -> OfflineStorePlan {
    if !request.offline {
        return OfflineStorePlan::Bypass;
    }
    if metadata.url.is_empty() {
        return OfflineStorePlan::Skip(OfflineSkipReason::ResponseUrlMissing);
    }
    if metadata.mime_type.is_empty() {
        return OfflineStorePlan::Skip(OfflineSkipReason::MimeTypeMissing);
    }
    if metadata.status.is_client_error() || metadata.status.is_server_error() {
        return OfflineStorePlan::Skip(OfflineSkipReason::ErrorStatus);
    }
    OfflineStorePlan::Store
}
