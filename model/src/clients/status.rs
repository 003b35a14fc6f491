pub use http::StatusCode;
use kube::Error;

/// Exposes the HTTP status of a failed API call, if there was one.
pub trait HttpStatusCode {
    fn status_code(&self) -> Option<StatusCode>;

    fn is_status_code(&self, status_code: StatusCode) -> bool {
        self.status_code()
            .map(|some| some == status_code)
            .unwrap_or_default()
    }
}

impl HttpStatusCode for kube::Error {
    fn status_code(&self) -> Option<StatusCode> {
        if let Error::Api(error_response) = self {
            StatusCode::from_u16(error_response.code).ok()
        } else {
            None
        }
    }
}

impl<T, E> HttpStatusCode for std::result::Result<T, E>
where
    E: HttpStatusCode,
{
    fn status_code(&self) -> Option<StatusCode> {
        self.as_ref().err().and_then(|e| e.status_code())
    }
}

/// Turns a `404` into `Ok(None)`. `on_not_found` receives the swallowed error, which is useful
/// for logging.
pub trait AllowNotFound<T, E> {
    fn allow_not_found<F>(self, on_not_found: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce(E);
}

impl<T, E> AllowNotFound<T, E> for std::result::Result<T, E>
where
    E: HttpStatusCode,
{
    fn allow_not_found<F>(self, on_not_found: F) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce(E),
    {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_status_code(StatusCode::NOT_FOUND) => {
                on_not_found(e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn not_found_becomes_none() {
        let mut swallowed = false;
        let result: std::result::Result<u8, kube::Error> = Err(api_error(404));
        let value = result.allow_not_found(|_| swallowed = true).unwrap();
        assert!(value.is_none());
        assert!(swallowed);
    }

    #[test]
    fn other_errors_pass_through() {
        let result: std::result::Result<u8, kube::Error> = Err(api_error(409));
        assert!(result.is_status_code(StatusCode::CONFLICT));
        assert!(result.allow_not_found(|_| ()).is_err());
    }

    #[test]
    fn success_is_some() {
        let result: std::result::Result<u8, kube::Error> = Ok(7);
        assert_eq!(result.allow_not_found(|_| ()).unwrap(), Some(7));
    }
}
