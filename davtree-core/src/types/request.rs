use uuid::Uuid;

/// Per-request facts decided once at request entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Identifier used to correlate log lines of one request
    pub request_id: Uuid,
    /// The client announced a chunked upload; chunk names resolve to their
    /// logical target file
    pub chunked_upload: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            chunked_upload: false,
        }
    }

    /// Sets the chunked-upload marker.
    pub fn chunked(mut self, chunked: bool) -> Self {
        self.chunked_upload = chunked;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
