//! Selects the responder for an inbound request

use crate::duplex::Negotiation;
use crate::http::InboundRequest;

/// Path of the manual browser test page
pub const STATIC_PAGE_PATH: &str = "/.ws";
/// Path of the push stream
pub const STREAM_PATH: &str = "/.sse";

/// The responder chosen for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Duplex(Negotiation),
    StaticPage,
    PushStream,
    Plain,
}

/// Classifies `request`; the first matching rule wins.
///
/// 1. a well-formed WebSocket upgrade, whatever the path
/// 2. the static page path
/// 3. the stream path
/// 4. everything else
///
/// An upgrade attempt that fails validation falls through to the path
/// rules.
pub fn classify(request: &InboundRequest) -> Route {
    if let Ok(negotiation) = Negotiation::from_request(request) {
        return Route::Duplex(negotiation);
    }
    match request.path() {
        STATIC_PAGE_PATH => Route::StaticPage,
        STREAM_PATH => Route::PushStream,
        _ => Route::Plain,
    }
}
