use log::{debug, warn};
use tungstenite::{
    handshake::server::{Callback, ErrorResponse, Request, Response},
    http::StatusCode,
};

/// A tungstenite handler that only upgrades requests for the configured path
pub struct RouteHandler {
    path: String,
}

impl RouteHandler {
    pub fn new<S: Into<String>>(path: S) -> Self {
        RouteHandler { path: path.into() }
    }

    pub fn matches(&self, request: &Request) -> bool {
        request.uri().path() == self.path
    }

    fn response_not_found() -> ErrorResponse {
        let mut response = ErrorResponse::new(Some("Not Found".to_string()));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }
}

impl Callback for RouteHandler {
    fn on_request(self, request: &Request, response: Response) -> Result<Response, ErrorResponse> {
        if self.matches(request) {
            debug!("upgrading request for {}", request.uri());
            Ok(response)
        } else {
            warn!("rejecting request for {}", request.uri());
            Err(Self::response_not_found())
        }
    }
}
