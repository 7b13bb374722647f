//! Normalization of transport failures into [`ServiceError`]
//!
//! The single place where requester errors become the common taxonomy:
//!
//! | Requester error | Service error |
//! |-----------------|---------------|
//! | response with status 404 | `NotFound` |
//! | any other response | converted from the body, then the status |
//! | aborted with `ECONNABORTED` | `GatewayTimeout` |
//! | aborted with another code | converted |
//! | no response | `BadGateway` |
//! | `{error, code}` from a replier | class of `code` |

use crate::error::{RequestError, ServiceError};
use serde_json::{json, Value};

const CONNECTION_ABORTED: &str = "ECONNABORTED";

pub fn map_request_error(error: RequestError) -> ServiceError {
    match error {
        RequestError::Response { status, data } => {
            let body_status = data.get("status").and_then(Value::as_u64);
            if status == 404 || body_status == Some(404) {
                ServiceError::convert_with_status(&data, Some(404)).into_not_found()
            } else {
                ServiceError::convert_with_status(&data, Some(status))
            }
        }
        RequestError::Aborted { code, message } if code == CONNECTION_ABORTED => {
            ServiceError::gateway_timeout(message).with_data(json!({ "code": code }))
        }
        RequestError::Aborted { code, message } => ServiceError::convert(&json!({ "code": code, "message": message })),
        RequestError::Network { message } => ServiceError::bad_gateway(message),
        RequestError::Transport(e) => ServiceError::bad_gateway(e.to_string()),
        RequestError::Remote { message, code } => match code {
            Some(code) => ServiceError::from_code(code, message),
            None => ServiceError::general(message),
        },
        RequestError::Rejected(e) => e,
        RequestError::Codec(e) => ServiceError::general(e.to_string()),
    }
}

impl ServiceError {
    fn into_not_found(self) -> Self {
        let message = self.message().to_string();
        let data = self.data().cloned();
        let err = ServiceError::not_found(message);
        match data {
            Some(data) => err.with_data(data),
            None => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use network::TransportError;

    #[test]
    fn test_404_is_not_found() {
        let err = map_request_error(RequestError::Response {
            status: 404,
            data: json!({"name": "GeneralError", "message": "Page not found"}),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Page not found");
    }

    #[test]
    fn test_other_responses_are_converted() {
        let err = map_request_error(RequestError::Response {
            status: 400,
            data: json!({"name": "BadRequest", "message": "Invalid id", "code": 400, "className": "bad-request"}),
        });
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = map_request_error(RequestError::Response {
            status: 500,
            data: Value::Null,
        });
        assert_eq!(err.kind(), ErrorKind::GeneralError);
    }

    #[test]
    fn test_rpc_timeout_is_timeout() {
        let err = map_request_error(RequestError::Response {
            status: 408,
            data: json!({"status": 408, "message": "Request timed out", "request": {}}),
        });
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.message(), "Request timed out");
    }

    #[test]
    fn test_aborted_is_gateway_timeout() {
        let err = map_request_error(RequestError::aborted("ECONNABORTED", "timeout of 100ms exceeded"));
        assert_eq!(err.kind(), ErrorKind::GatewayTimeout);
        assert_eq!(err.code(), 504);
    }

    #[test]
    fn test_no_response_is_bad_gateway() {
        let err = map_request_error(RequestError::network("connect ECONNREFUSED"));
        assert_eq!(err.kind(), ErrorKind::BadGateway);

        let err = map_request_error(RequestError::Transport(TransportError::closed("gone")));
        assert_eq!(err.kind(), ErrorKind::BadGateway);
    }

    #[test]
    fn test_remote_failure_keeps_class() {
        let err = map_request_error(RequestError::Remote {
            message: "Can not find service 'x'".into(),
            code: Some(404),
        });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Can not find service 'x'");
    }
}
